//! Offline zero-click reconciliation.
//!
//! Reads the same click statistics export the admin upload accepts and
//! prints the JSON result, so a run can be scripted or diffed.

use std::path::Path;

use anyhow::Context;

/// Parse `path` and either preview or apply the zero-click move.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the preview
/// query fails. Per-row move failures are reported in the printed summary.
pub(crate) async fn run_reconcile(
    pool: &sqlx::PgPool,
    path: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed = epdb_core::parse_click_stats(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!(
        rows = parsed.rows.len(),
        invalid = parsed.invalid_rows,
        skipped = parsed.skipped_rows,
        "parsed click statistics"
    );

    let output = if dry_run {
        let preview = epdb_db::preview_zero_clicks(pool, &parsed).await?;
        serde_json::to_string_pretty(&preview)?
    } else {
        let summary = epdb_db::reconcile_zero_clicks(pool, &parsed).await;
        if !summary.is_balanced() {
            tracing::warn!(?summary, "reconcile counts do not add up");
        }
        serde_json::to_string_pretty(&summary)?
    };
    println!("{output}");
    Ok(())
}
