//! Spreadsheet export of catalog records, and reading of uploaded sheets.
//!
//! Records are JSON objects; the first record of a sheet fixes its header row
//! (key order is preserved through `serde_json`'s `preserve_order`). Later
//! records are written against those headers, with missing keys left blank.

mod read;

pub use read::read_first_sheet;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::{Map, Number, Value};
use thiserror::Error;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error("sheet '{sheet}' has {count} columns; the format allows {max}")]
    TooManyColumns {
        sheet: String,
        count: usize,
        max: usize,
    },
    #[error("sheet '{sheet}' has {count} rows; the format allows {max}")]
    TooManyRows {
        sheet: String,
        count: usize,
        max: usize,
    },
    #[error("unreadable workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("workbook has no worksheet")]
    MissingSheet,
}

/// One worksheet worth of records.
#[derive(Debug, Clone)]
pub struct Sheet<'a> {
    pub name: &'a str,
    pub records: &'a [Map<String, Value>],
}

// Excel limits.
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Header row of a sheet: the keys of its first record, in order.
#[must_use]
pub fn headers(records: &[Map<String, Value>]) -> Vec<&str> {
    records
        .first()
        .map(|first| first.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Renders the sheets into an in-memory `.xlsx` file. A sheet without records
/// is written blank.
///
/// # Errors
///
/// Returns [`ExportError::TooManyColumns`] or [`ExportError::TooManyRows`]
/// when a sheet exceeds the format's limits, and [`ExportError::Xlsx`] when
/// the writer fails (for example an invalid sheet name).
pub fn render_workbook(sheets: &[Sheet<'_>]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;
        write_sheet(worksheet, sheet, &header_format)?;
    }
    if sheets.is_empty() {
        workbook.add_worksheet();
    }

    let bytes = workbook.save_to_buffer()?;
    tracing::debug!(sheets = sheets.len(), bytes = bytes.len(), "rendered workbook");
    Ok(bytes)
}

/// `Content-Disposition` value that makes browsers download `filename`.
#[must_use]
pub fn attachment_disposition(filename: &str) -> String {
    format!("attachment; filename=\"{filename}\"")
}

fn write_sheet(
    worksheet: &mut Worksheet,
    sheet: &Sheet<'_>,
    header_format: &Format,
) -> Result<(), ExportError> {
    let headers = headers(sheet.records);
    if headers.len() > MAX_COLUMNS {
        return Err(ExportError::TooManyColumns {
            sheet: sheet.name.to_string(),
            count: headers.len(),
            max: MAX_COLUMNS,
        });
    }
    if sheet.records.len() >= MAX_ROWS {
        return Err(ExportError::TooManyRows {
            sheet: sheet.name.to_string(),
            count: sheet.records.len(),
            max: MAX_ROWS - 1,
        });
    }

    for (col, header) in (0u16..).zip(&headers) {
        worksheet.write_string_with_format(0, col, *header, header_format)?;
    }

    for (row, record) in (1u32..).zip(sheet.records) {
        for (col, header) in (0u16..).zip(&headers) {
            write_cell(worksheet, row, col, record.get(*header))?;
        }
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&Value>,
) -> Result<(), XlsxError> {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => {
            worksheet.write_string(row, col, s)?;
        }
        Some(Value::Number(n)) => match exact_f64(n) {
            Some(f) => {
                worksheet.write_number(row, col, f)?;
            }
            None => {
                worksheet.write_string(row, col, n.to_string())?;
            }
        },
        Some(Value::Bool(b)) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Some(nested @ (Value::Array(_) | Value::Object(_))) => {
            worksheet.write_string(row, col, nested.to_string())?;
        }
    }
    Ok(())
}

// Largest integer magnitude an f64 cell holds without rounding.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// The number as an f64 cell value, or `None` when an integer would lose
/// digits and must be written as text.
#[allow(clippy::cast_precision_loss)]
fn exact_f64(n: &Number) -> Option<f64> {
    if let Some(i) = n.as_i64() {
        return (i.unsigned_abs() <= MAX_EXACT_INTEGER).then_some(i as f64);
    }
    if let Some(u) = n.as_u64() {
        return (u <= MAX_EXACT_INTEGER).then_some(u as f64);
    }
    n.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Map<String, Value>> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("expected object, got {other}"),
            })
            .collect()
    }

    fn is_zip(bytes: &[u8]) -> bool {
        bytes.starts_with(b"PK\x03\x04")
    }

    #[test]
    fn headers_follow_first_record_key_order() {
        let rows = records(vec![
            json!({ "title": "a", "id": "1", "price_pc": 10 }),
            json!({ "id": "2", "title": "b" }),
        ]);
        assert_eq!(headers(&rows), vec!["title", "id", "price_pc"]);
    }

    #[test]
    fn empty_export_is_a_valid_workbook() {
        let bytes = render_workbook(&[Sheet {
            name: "Removed_Data",
            records: &[],
        }])
        .expect("render");
        assert!(is_zip(&bytes));
    }

    #[test]
    fn mixed_value_types_render() {
        let rows = records(vec![json!({
            "id": "EP-1",
            "price_pc": 39000,
            "is_main_image": true,
            "video_url": null,
            "tags": ["a", "b"],
            "meta": { "k": 1 }
        })]);
        let deleted = records(vec![json!({ "deleted_id": 1 })]);
        let bytes = render_workbook(&[
            Sheet {
                name: "EP_Data",
                records: &rows,
            },
            Sheet {
                name: "Deleted_Data",
                records: &deleted,
            },
        ])
        .expect("render");
        assert!(is_zip(&bytes));
    }

    #[test]
    fn large_integers_are_kept_as_text() {
        assert_eq!(exact_f64(&Number::from(45_000)), Some(45_000.0));
        assert_eq!(exact_f64(&Number::from(-(1_i64 << 53))), Some(-9_007_199_254_740_992.0));
        assert_eq!(exact_f64(&Number::from((1_i64 << 53) + 1)), None);
        assert_eq!(exact_f64(&Number::from(u64::MAX)), None);
        assert_eq!(
            exact_f64(&Number::from_f64(0.5).expect("finite")),
            Some(0.5)
        );

        let rows = records(vec![json!({ "id": 9_007_199_254_740_993_i64 })]);
        render_workbook(&[Sheet {
            name: "Data",
            records: &rows,
        }])
        .expect("large integer renders");
    }

    #[test]
    fn invalid_sheet_name_is_an_error() {
        let err = render_workbook(&[Sheet {
            name: "bad/name",
            records: &[],
        }])
        .expect_err("slash is not allowed in sheet names");
        assert!(matches!(err, ExportError::Xlsx(_)));
    }

    #[test]
    fn disposition_quotes_filename() {
        assert_eq!(
            attachment_disposition("removed_items.xlsx"),
            "attachment; filename=\"removed_items.xlsx\""
        );
    }
}
