//! Reading uploaded `.xlsx` sheets back into records.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use serde_json::{Map, Number, Value};

use crate::ExportError;

// Integral floats up to this magnitude become JSON integers.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// The first worksheet as records keyed by its header row.
///
/// Blank cells are left out of their record and blank rows are skipped.
/// Columns with an empty header are ignored.
///
/// # Errors
///
/// Returns [`ExportError::Read`] when the bytes are not a readable workbook
/// and [`ExportError::MissingSheet`] when it has no worksheet.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, ExportError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ExportError::MissingSheet)??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let records: Vec<Map<String, Value>> = rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .filter(|(header, _)| !header.is_empty())
                .filter_map(|(header, cell)| cell_value(cell).map(|v| (header.clone(), v)))
                .collect::<Map<String, Value>>()
        })
        .filter(|record| !record.is_empty())
        .collect();

    tracing::debug!(
        columns = headers.len(),
        records = records.len(),
        "read uploaded worksheet"
    );
    Ok(records)
}

#[allow(clippy::cast_possible_truncation)]
fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => {
            Some(Value::from(*f as i64))
        }
        Data::Float(f) => Some(Number::from_f64(*f).map_or(Value::Null, Value::Number)),
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(other.to_string())),
    }
}
