//! EP spreadsheet comparison and import from a local file.

use std::path::Path;

use anyhow::Context;
use epdb_core::{compare_sheet, normalize_sheet_rows, prepare_import_rows, HeaderStyle};

fn read_rows(path: &Path) -> anyhow::Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    epdb_export::read_first_sheet(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Print how the sheet at `path` differs from the active catalog.
///
/// # Errors
///
/// Returns an error if the workbook cannot be read or the catalog query fails.
pub(crate) async fn run_diff(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let sheet = normalize_sheet_rows(read_rows(path)?, HeaderStyle::Diff);
    let existing = epdb_db::list_product_keys(pool).await?;
    let diff = compare_sheet(sheet, existing);
    tracing::info!(
        to_add = diff.items_to_add.len(),
        to_remove = diff.items_to_remove.len(),
        unchanged = diff.unchanged_items.len(),
        "compared EP sheet with catalog"
    );
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}

/// Upsert the sheet at `path` into the catalog by product id.
///
/// # Errors
///
/// Returns an error if the workbook cannot be read, has no usable rows, or
/// the upsert fails.
pub(crate) async fn run_import(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let batch = prepare_import_rows(normalize_sheet_rows(read_rows(path)?, HeaderStyle::Import));
    if batch.rows.is_empty() {
        anyhow::bail!("{} has no row with both a product id and a title", path.display());
    }
    let imported = epdb_db::upsert_products(pool, &batch.rows).await?;
    println!("imported {imported} row(s), skipped {}", batch.skipped);
    Ok(())
}
