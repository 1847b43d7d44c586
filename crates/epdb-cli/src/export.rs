use std::path::{Path, PathBuf};

use anyhow::Context;
use epdb_export::{render_workbook, Sheet};
use serde_json::{Map, Value};

pub(crate) fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "ep_data_export_{}.xlsx",
        chrono::Local::now().format("%Y%m%d")
    ))
}

/// Write `EP_Data` and `Deleted_Data` sheets to `out`.
///
/// # Errors
///
/// Returns an error if either table cannot be read, the workbook cannot be
/// rendered, or the file cannot be written.
pub(crate) async fn run_export(pool: &sqlx::PgPool, out: &Path) -> anyhow::Result<()> {
    let active: Vec<Map<String, Value>> = epdb_db::list_products_json(pool)
        .await?
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    let deleted: Vec<Map<String, Value>> = epdb_db::list_deleted_items(pool)
        .await?
        .iter()
        .map(epdb_db::DeletedItemRow::flatten)
        .collect();

    let bytes = render_workbook(&[
        Sheet {
            name: "EP_Data",
            records: &active,
        },
        Sheet {
            name: "Deleted_Data",
            records: &deleted,
        },
    ])?;
    std::fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;

    tracing::info!(
        active = active.len(),
        deleted = deleted.len(),
        path = %out.display(),
        "exported catalog"
    );
    println!(
        "wrote {} active and {} deleted rows to {}",
        active.len(),
        deleted.len(),
        out.display()
    );
    Ok(())
}
