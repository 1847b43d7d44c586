//! Shape of active EP catalog rows as they travel through JSON.

use serde_json::{Map, Value};

/// Store-assigned fields dropped from incoming candidates.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Columns of `ep_data` a candidate may populate, in table order.
pub const PRODUCT_COLUMNS: &[&str] = &[
    "original_id",
    "title",
    "price_pc",
    "benefit_price",
    "normal_price",
    "link",
    "mobile_link",
    "image_link",
    "add_image_link",
    "video_url",
    "category_name1",
    "category_name2",
    "category_name3",
    "category_name4",
    "brand",
    "maker",
    "origin",
    "age_group",
    "gender",
    "city",
];

/// Readies a candidate for insertion.
///
/// A spreadsheet `id` with no `original_id` alongside it is kept as the
/// `original_id`; then the system fields are removed so the store assigns them.
#[must_use]
pub fn prepare_candidate(mut item: Map<String, Value>) -> Map<String, Value> {
    let has_original_id = item
        .get("original_id")
        .and_then(value_as_text)
        .is_some_and(|v| !v.is_empty());

    if !has_original_id {
        if let Some(id) = item.get("id").and_then(value_as_text) {
            if !id.is_empty() {
                item.insert("original_id".to_string(), Value::String(id));
            }
        }
    }

    for field in SYSTEM_FIELDS {
        item.remove(field);
    }
    item
}

/// The merchant-facing product code of a row: `original_id`, else `id`.
#[must_use]
pub fn source_code(item: &Map<String, Value>) -> Option<String> {
    ["original_id", "id"]
        .iter()
        .filter_map(|k| item.get(*k).and_then(value_as_text))
        .find(|v| !v.is_empty())
}

/// String fields as-is, numbers rendered; anything else is absent.
#[must_use]
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
