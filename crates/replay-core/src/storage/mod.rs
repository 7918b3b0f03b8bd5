mod config;
pub mod database;
pub mod migrations;
mod traits;

pub use config::{Config, NotificationsConfig, ReportsConfig};
pub use database::Database;
pub use traits::{DueReportQuery, ProfileStore, ProgressStore};

use std::path::PathBuf;

/// Returns `~/.config/replay[-dev]/` based on REPLAY_ENV.
///
/// Set REPLAY_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REPLAY_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("replay-dev")
    } else {
        base_dir.join("replay")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
