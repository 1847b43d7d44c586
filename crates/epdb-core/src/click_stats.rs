//! Parsing of ad-console click statistics exports.
//!
//! Exports arrive either as UTF-8 or as CP949 (the console's default for
//! Korean locales). Columns are located by substring so that header variants
//! such as `상품ID` / `상품id` or `클릭수` / `클릭수(회)` resolve the same way.

use std::borrow::Cow;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

const PRODUCT_ID_HEADERS: &[&str] = &["상품id", "product_id", "productid"];
const PRODUCT_NAME_HEADERS: &[&str] = &["상품명", "상품이름", "product_name", "productname"];
const CLICK_HEADERS: &[&str] = &["클릭수", "clicks"];
const IMPRESSION_HEADERS: &[&str] = &["노출수", "impressions"];
const CTR_HEADERS: &[&str] = &["클릭율", "클릭률", "ctr"];
const CPC_FEE_HEADERS: &[&str] = &["cpc적용수수료", "cpc클릭당수수료", "cpc_fee"];

/// One product row of a click statistics export. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickStatRow {
    pub product_id: String,
    pub product_name: String,
    pub clicks: u64,
    pub impressions: Option<u64>,
    pub ctr: Option<Decimal>,
    pub cpc_fee: Option<Decimal>,
}

impl ClickStatRow {
    #[must_use]
    pub fn is_zero_click(&self) -> bool {
        self.clicks == 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedClickStats {
    /// Accepted rows in file order.
    pub rows: Vec<ClickStatRow>,
    /// Rows whose click cell was present but not a number.
    pub invalid_rows: usize,
    /// Rows dropped for lacking an id or a name.
    pub skipped_rows: usize,
}

impl ParsedClickStats {
    pub fn zero_click_rows(&self) -> impl Iterator<Item = &ClickStatRow> {
        self.rows.iter().filter(|r| r.is_zero_click())
    }
}

#[derive(Debug, Error)]
pub enum ClickStatsError {
    #[error("click statistics file is missing a {0} column")]
    MissingColumn(&'static str),
    #[error("click statistics file has no data rows")]
    Empty,
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Decodes raw upload bytes, stripping a UTF-8 BOM and falling back to CP949.
#[must_use]
pub fn decode_export(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            // encoding_rs's EUC-KR is the WHATWG definition, i.e. CP949.
            let (text, _, _) = encoding_rs::EUC_KR.decode(bytes);
            text
        }
    }
}

/// Parses a click statistics export.
///
/// # Errors
///
/// Returns [`ClickStatsError::MissingColumn`] when the id, name, or click
/// column cannot be located, [`ClickStatsError::Empty`] when the file holds
/// no data rows, and [`ClickStatsError::Csv`] on structural CSV errors.
pub fn parse_click_stats(bytes: &[u8]) -> Result<ParsedClickStats, ClickStatsError> {
    let text = decode_export(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let idx_id = find_column(&headers, PRODUCT_ID_HEADERS)
        .ok_or(ClickStatsError::MissingColumn("product id"))?;
    let idx_name = find_column(&headers, PRODUCT_NAME_HEADERS)
        .ok_or(ClickStatsError::MissingColumn("product name"))?;
    let idx_clicks =
        find_column(&headers, CLICK_HEADERS).ok_or(ClickStatsError::MissingColumn("clicks"))?;
    let idx_impressions = find_column(&headers, IMPRESSION_HEADERS);
    let idx_ctr = find_column(&headers, CTR_HEADERS);
    let idx_fee = find_column(&headers, CPC_FEE_HEADERS);

    let mut parsed = ParsedClickStats::default();
    let mut seen_records = 0usize;

    for record in rdr.records() {
        let record = record?;
        seen_records += 1;

        let product_id = record.get(idx_id).unwrap_or_default();
        let product_name = record.get(idx_name).unwrap_or_default();
        if product_id.is_empty() || product_name.is_empty() {
            parsed.skipped_rows += 1;
            continue;
        }

        let Some(clicks) = parse_count(record.get(idx_clicks).unwrap_or_default()) else {
            parsed.invalid_rows += 1;
            continue;
        };

        parsed.rows.push(ClickStatRow {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            clicks,
            impressions: idx_impressions
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .and_then(parse_count),
            ctr: idx_ctr.and_then(|i| record.get(i)).and_then(parse_decimal),
            cpc_fee: idx_fee.and_then(|i| record.get(i)).and_then(parse_decimal),
        });
    }

    if seen_records == 0 {
        return Err(ClickStatsError::Empty);
    }

    Ok(parsed)
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let lowered = header.to_lowercase();
        candidates.iter().any(|c| lowered.contains(c))
    })
}

/// An empty cell counts as zero; separators are tolerated.
fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Some(0);
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    Decimal::from_str(&cleaned)
        .ok()
        .filter(|d| d.fract().is_zero() && !d.is_sign_negative())
        .and_then(|d| d.to_u64())
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '%')).collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "상품ID,상품명,노출수,클릭수,클릭율(%),CPC적용수수료\n\
        P1,오사카 자유여행,1200,0,0.00,0\n\
        P2,도쿄 3박4일,\"3,400\",12,0.35,1500\n\
        P3,괌 패키지,800,,0,0\n";

    #[test]
    fn parses_utf8_export_and_flags_zero_clicks() {
        let parsed = parse_click_stats(SAMPLE.as_bytes()).expect("parse");
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[1].impressions, Some(3400));
        assert_eq!(parsed.rows[1].ctr, Some(Decimal::new(35, 2)));
        let zero: Vec<&str> = parsed.zero_click_rows().map(|r| r.product_id.as_str()).collect();
        assert_eq!(zero, vec!["P1", "P3"]);
    }

    #[test]
    fn decodes_cp949_bytes() {
        let (encoded, _, had_errors) = encoding_rs::EUC_KR.encode(SAMPLE);
        assert!(!had_errors);
        assert!(std::str::from_utf8(&encoded).is_err());
        let parsed = parse_click_stats(&encoded).expect("parse cp949");
        assert_eq!(parsed.rows[0].product_name, "오사카 자유여행");
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(SAMPLE.as_bytes());
        let parsed = parse_click_stats(&bytes).expect("parse");
        assert_eq!(parsed.rows[0].product_id, "P1");
    }

    #[test]
    fn accepts_english_headers() {
        let csv = "product_id,product_name,clicks\nA,Alpha,0\nB,Beta,3\n";
        let parsed = parse_click_stats(csv.as_bytes()).expect("parse");
        assert_eq!(parsed.zero_click_rows().count(), 1);
    }

    #[test]
    fn missing_click_column_is_reported() {
        let csv = "상품ID,상품명\nP1,x\n";
        let err = parse_click_stats(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ClickStatsError::MissingColumn("clicks")));
    }

    #[test]
    fn header_only_file_is_empty() {
        let csv = "상품ID,상품명,클릭수\n";
        assert!(matches!(
            parse_click_stats(csv.as_bytes()),
            Err(ClickStatsError::Empty)
        ));
    }

    #[test]
    fn rows_without_id_or_name_are_skipped() {
        let csv = "상품ID,상품명,클릭수\n,이름만,0\nP9,,0\nP10,ok,0\n";
        let parsed = parse_click_stats(csv.as_bytes()).expect("parse");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped_rows, 2);
    }

    #[test]
    fn non_numeric_clicks_are_invalid_not_zero() {
        let csv = "상품ID,상품명,클릭수\nP1,a,n/a\nP2,b,0\n";
        let parsed = parse_click_stats(csv.as_bytes()).expect("parse");
        assert_eq!(parsed.invalid_rows, 1);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].product_id, "P2");
    }

    #[test]
    fn parse_count_handles_separators_and_decimals() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count(""), Some(0));
        assert_eq!(parse_count("3.0"), Some(3));
        assert_eq!(parse_count("2.5"), None);
        assert_eq!(parse_count("-1"), None);
    }
}
