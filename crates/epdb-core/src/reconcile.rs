//! Tally of a zero-click reconciliation run.

use serde::Serialize;

use crate::click_stats::ParsedClickStats;

/// Backup reason recorded for rows moved by a zero-click run.
pub const ZERO_CLICK_REASON: &str = "zero clicks";

/// Backup reason recorded when the admin UI removes rows during EP processing.
pub const EP_PROCESSING_REASON: &str = "removed during EP data processing";

/// Result of moving one identifier into the backup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { backup_id: i64, title: String },
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedItem {
    pub product_id: String,
    pub title: String,
    pub backup_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub total_csv_items: usize,
    pub zero_click_items: usize,
    // Wire names predate the admin UI's rename of the backup table.
    #[serde(rename = "movedToDelect")]
    pub moved_to_delete: usize,
    pub not_found_in_ep_data: usize,
    pub failed_items: usize,
    /// Zero-click rows this run resolved: moved plus not found.
    #[serde(rename = "totalMovedToDelect")]
    pub total_moved_to_delete: usize,
    pub invalid_rows: usize,
    pub moved_items: Vec<MovedItem>,
    pub not_found_ids: Vec<String>,
    pub failed_ids: Vec<String>,
}

impl ReconcileSummary {
    /// Seeds the file-level counts before any row is moved.
    #[must_use]
    pub fn from_parsed(parsed: &ParsedClickStats) -> Self {
        Self {
            total_csv_items: parsed.rows.len(),
            zero_click_items: parsed.zero_click_rows().count(),
            invalid_rows: parsed.invalid_rows,
            ..Self::default()
        }
    }

    pub fn record(&mut self, product_id: &str, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Moved { backup_id, title } => {
                self.moved_to_delete += 1;
                self.total_moved_to_delete += 1;
                self.moved_items.push(MovedItem {
                    product_id: product_id.to_string(),
                    title,
                    backup_id,
                });
            }
            MoveOutcome::NotFound => {
                self.not_found_in_ep_data += 1;
                self.total_moved_to_delete += 1;
                self.not_found_ids.push(product_id.to_string());
            }
            MoveOutcome::Failed(_) => {
                self.failed_items += 1;
                self.failed_ids.push(product_id.to_string());
            }
        }
    }

    /// Every zero-click row has exactly one outcome.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.zero_click_items == self.moved_to_delete + self.not_found_in_ep_data + self.failed_items
    }
}
