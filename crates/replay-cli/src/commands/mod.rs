pub mod config;
pub mod journal;
pub mod meditation;
pub mod profile;
pub mod progress;
pub mod report;

use std::error::Error;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use replay_core::{Config, Database, OneSignalClient, ProgressService, ProgressUpdate, TagSynchronizer};
use serde_json::json;
use tracing::debug;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Global flags shared by every command.
pub struct Context {
    pub user: Option<String>,
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl Context {
    pub fn user(&self) -> Result<&str, Box<dyn Error>> {
        Ok(self
            .user
            .as_deref()
            .ok_or("--user (or REPLAY_USER) is required")?)
    }

    pub fn load_config(&self) -> Result<Config, Box<dyn Error>> {
        Ok(match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        })
    }

    pub fn save_config(&self, config: &Config) -> Result<(), Box<dyn Error>> {
        match &self.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        Ok(())
    }

    /// Service wired from config. Tag sync is attached only when the push
    /// audience service is enabled and has credentials.
    pub fn service(&self) -> Result<ProgressService<Database>, Box<dyn Error>> {
        let config = self.load_config()?;
        let db = match &self.db {
            Some(path) => Database::open_at(path)?,
            None => Database::open()?,
        };
        let svc = ProgressService::from_config(db, &config);

        let notifications = config.notifications.clone().with_env_overrides();
        if !notifications.is_configured() {
            debug!("push audience service not configured, tag sync disabled");
            return Ok(svc);
        }
        let client = OneSignalClient::from_config(&notifications)?;
        Ok(svc.with_tag_sync(TagSynchronizer::new(client)))
    }
}

/// RFC 3339 instant, or now when absent.
pub fn instant_or_now(value: Option<&str>) -> Result<DateTime<Utc>, Box<dyn Error>> {
    match value {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a mutation result. A failed tag push is reported, not fatal: the
/// counter change is already committed.
pub fn print_update(update: &ProgressUpdate) -> CommandResult {
    let tag_sync = match &update.tag_sync {
        None => json!(null),
        Some(Ok(outcome)) => serde_json::to_value(outcome)?,
        Some(Err(e)) => json!({ "status": "failed", "error": e.to_string() }),
    };
    print_json(&json!({ "summary": update.summary, "tagSync": tag_sync }))
}
