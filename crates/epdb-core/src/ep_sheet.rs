//! Merchant EP spreadsheets against the active catalog.
//!
//! A sheet row matches a stored product by title first; only when the titles
//! differ (or one is blank) is the product code compared, exactly and then
//! case-insensitively. Stored rows are keyed by `original_id`, else `id`.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::catalog::value_as_text;

static ZERO_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{200B}-\x{200D}\x{FEFF}]").expect("valid regex"));
static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));
static PUNCT_SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{P}\p{S}]+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Diff header aliases; anything else is lowercased.
const DIFF_HEADERS: &[(&str, &str)] = &[
    ("id", "id"),
    ("상품id", "id"),
    ("상품 id", "id"),
    ("title", "title"),
    ("제목", "title"),
    ("상품명", "title"),
    ("상품 명", "title"),
];

/// Import header map onto `ep_data` columns; anything else is kept as written.
const IMPORT_HEADERS: &[(&str, &str)] = &[
    ("상품ID", "id"),
    ("상품명", "title"),
    ("PC가격", "price_pc"),
    ("혜택가", "benefit_price"),
    ("정가", "normal_price"),
    ("링크", "link"),
    ("모바일링크", "mobile_link"),
    ("이미지링크", "image_link"),
    ("추가이미지링크", "add_image_link"),
    ("동영상URL", "video_url"),
    ("카테고리1", "category_name1"),
    ("카테고리2", "category_name2"),
    ("카테고리3", "category_name3"),
    ("카테고리4", "category_name4"),
    ("브랜드", "brand"),
    ("제조사", "maker"),
    ("원산지", "origin"),
    ("연령대", "age_group"),
    ("성별", "gender"),
    ("도시", "city"),
];

const PRICE_COLUMNS: [&str; 3] = ["price_pc", "benefit_price", "normal_price"];

/// Which header vocabulary a sheet is read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// Only `id` and `title` matter; other headers are lowercased.
    Diff,
    /// Korean column titles map onto `ep_data` columns.
    Import,
}

impl HeaderStyle {
    #[must_use]
    pub fn normalize(self, header: &str) -> String {
        let trimmed = header.trim();
        match self {
            Self::Diff => {
                let lower = trimmed.to_lowercase();
                DIFF_HEADERS
                    .iter()
                    .find(|(alias, _)| *alias == lower)
                    .map_or(lower, |(_, column)| (*column).to_string())
            }
            Self::Import => IMPORT_HEADERS
                .iter()
                .find(|(alias, _)| *alias == trimmed)
                .map_or_else(|| trimmed.to_string(), |(_, column)| (*column).to_string()),
        }
    }
}

/// Renames every header through `style` and trims string cells.
#[must_use]
pub fn normalize_sheet_rows(
    rows: Vec<Map<String, Value>>,
    style: HeaderStyle,
) -> Vec<Map<String, Value>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other,
                    };
                    (style.normalize(&key), value)
                })
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Product code as compared: zero-width characters removed, runs of `_`
/// collapsed, trimmed, NFC. Case is kept.
#[must_use]
pub fn normalize_id(raw: &str) -> Option<String> {
    let stripped = ZERO_WIDTH.replace_all(raw, "");
    let collapsed = UNDERSCORES.replace_all(&stripped, "_");
    let trimmed = collapsed.trim();
    (!trimmed.is_empty()).then(|| trimmed.nfc().collect())
}

/// [`normalize_id`], lowercased.
#[must_use]
pub fn normalize_id_loose(raw: &str) -> Option<String> {
    normalize_id(raw).map(|id| id.to_lowercase())
}

/// Title as compared: NFKC folded, punctuation and symbols turned into
/// spaces, whitespace collapsed, lowercased.
#[must_use]
pub fn normalize_title(raw: &str) -> Option<String> {
    let stripped = ZERO_WIDTH.replace_all(raw, "");
    let folded: String = stripped.nfkc().collect();
    let spaced = PUNCT_SYMBOLS.replace_all(&folded, " ");
    let collapsed = WHITESPACE.replace_all(&spaced, " ");
    let trimmed = collapsed.trim();
    (!trimmed.is_empty()).then(|| trimmed.nfc().collect::<String>().to_lowercase())
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// The identifying columns of a stored product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductKey {
    pub id: String,
    pub original_id: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProductKey {
    fn code(&self) -> &str {
        self.original_id
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// Which comparisons a sheet row failed, for rows reported as new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReason {
    pub id: Option<String>,
    pub title: Option<String>,
    pub title_match: bool,
    pub id_exact_match: bool,
    pub id_loose_match: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDiff {
    pub items_to_add: Vec<Map<String, Value>>,
    pub items_to_remove: Vec<ProductKey>,
    pub unchanged_items: Vec<Map<String, Value>>,
    pub why_to_add: Vec<AddReason>,
    pub excel_count: usize,
    pub db_count: usize,
}

#[derive(Debug, Clone, Default)]
struct MatchKeys {
    id: Option<String>,
    id_loose: Option<String>,
    title: Option<String>,
}

impl MatchKeys {
    fn new(code: Option<&str>, title: Option<&str>) -> Self {
        Self {
            id: code.and_then(normalize_id),
            id_loose: code.and_then(normalize_id_loose),
            title: title.and_then(normalize_title),
        }
    }

    fn of_sheet_row(row: &Map<String, Value>) -> Self {
        let text = |key: &str| row.get(key).and_then(value_as_text);
        Self::new(text("id").as_deref(), text("title").as_deref())
    }
}

#[derive(Debug, Default)]
struct KeyIndex {
    ids: HashSet<String>,
    ids_loose: HashSet<String>,
    titles: HashSet<String>,
}

impl KeyIndex {
    fn insert(&mut self, keys: MatchKeys) {
        self.ids.extend(keys.id);
        self.ids_loose.extend(keys.id_loose);
        self.titles.extend(keys.title);
    }

    fn has_title(&self, keys: &MatchKeys) -> bool {
        keys.title.as_ref().is_some_and(|t| self.titles.contains(t))
    }

    fn has_id(&self, keys: &MatchKeys) -> bool {
        keys.id.as_ref().is_some_and(|id| self.ids.contains(id))
    }

    fn has_id_loose(&self, keys: &MatchKeys) -> bool {
        keys.id_loose.as_ref().is_some_and(|id| self.ids_loose.contains(id))
    }

    /// Title first; the code only decides when the title does not match.
    fn matches(&self, keys: &MatchKeys) -> bool {
        self.has_title(keys) || self.has_id(keys) || self.has_id_loose(keys)
    }
}

/// Splits a normalized sheet into rows to add and rows already stored, and
/// lists stored products the sheet no longer carries.
#[must_use]
pub fn compare_sheet(sheet: Vec<Map<String, Value>>, existing: Vec<ProductKey>) -> SheetDiff {
    let mut stored = KeyIndex::default();
    for product in &existing {
        stored.insert(MatchKeys::new(Some(product.code()), product.title.as_deref()));
    }

    let sheet_keys: Vec<MatchKeys> = sheet.iter().map(MatchKeys::of_sheet_row).collect();
    let mut incoming = KeyIndex::default();
    for keys in &sheet_keys {
        incoming.insert(keys.clone());
    }

    let mut diff = SheetDiff {
        excel_count: sheet.len(),
        db_count: existing.len(),
        ..SheetDiff::default()
    };

    for (row, keys) in sheet.into_iter().zip(&sheet_keys) {
        if stored.matches(keys) {
            diff.unchanged_items.push(row);
            continue;
        }
        diff.why_to_add.push(AddReason {
            id: row.get("id").and_then(value_as_text),
            title: row.get("title").and_then(value_as_text),
            title_match: stored.has_title(keys),
            id_exact_match: stored.has_id(keys),
            id_loose_match: stored.has_id_loose(keys),
        });
        diff.items_to_add.push(row);
    }

    diff.items_to_remove = existing
        .into_iter()
        .filter(|product| {
            let keys = MatchKeys::new(Some(product.code()), product.title.as_deref());
            !incoming.matches(&keys)
        })
        .collect();

    diff
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Sheet rows ready to upsert into `ep_data`, keyed by `id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBatch {
    pub rows: Vec<Map<String, Value>>,
    /// Rows dropped for lacking an `id` or a `title`.
    pub skipped: usize,
}

/// Prepares header-normalized import rows: `id` becomes text, prices become
/// integers (or null when unreadable), and a repeated `id` keeps its last row
/// in the position of its first.
#[must_use]
pub fn prepare_import_rows(rows: Vec<Map<String, Value>>) -> ImportBatch {
    let mut batch = ImportBatch::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut row in rows {
        let id = row.get("id").and_then(value_as_text).filter(|v| !v.is_empty());
        let has_title = row
            .get("title")
            .and_then(value_as_text)
            .is_some_and(|v| !v.is_empty());
        let Some(id) = id.filter(|_| has_title) else {
            batch.skipped += 1;
            continue;
        };

        row.insert("id".to_string(), Value::String(id.clone()));
        for column in PRICE_COLUMNS {
            if let Some(value) = row.get_mut(column) {
                *value = price_value(value);
            }
        }

        match positions.get(&id) {
            Some(&at) => batch.rows[at] = row,
            None => {
                positions.insert(id, batch.rows.len());
                batch.rows.push(row);
            }
        }
    }
    batch
}

#[allow(clippy::cast_possible_truncation)]
fn price_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map_or(Value::Null, Value::from),
        Value::String(s) => s
            .trim()
            .replace(',', "")
            .parse::<i64>()
            .map_or(Value::Null, Value::from),
        _ => Value::Null,
    }
}

#[cfg(test)]
#[path = "ep_sheet_test.rs"]
mod tests;
