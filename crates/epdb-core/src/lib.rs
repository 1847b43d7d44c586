pub mod app_config;
pub mod catalog;
pub mod city;
pub mod click_stats;
pub mod config;
pub mod ep_sheet;
pub mod reconcile;
pub mod replacement;
pub mod similarity;
pub mod table_policy;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use city::{match_city_images, normalize_city_name, CityImage};
pub use click_stats::{parse_click_stats, ClickStatRow, ClickStatsError, ParsedClickStats};
pub use config::{load_app_config, load_app_config_from_env};
pub use ep_sheet::{
    compare_sheet, normalize_sheet_rows, prepare_import_rows, HeaderStyle, ImportBatch, ProductKey,
    SheetDiff,
};
pub use reconcile::{MoveOutcome, MovedItem, ReconcileSummary};
pub use table_policy::{policy_for, policy_for_op, PolicyError, TableOp, TablePolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
