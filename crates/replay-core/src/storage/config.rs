//! TOML-based application configuration.
//!
//! Stores:
//! - The default timezone used when a user has no usable preference
//! - Unlock and weekly report thresholds
//! - Report dispatch claim/retry limits
//! - Push audience (OneSignal) credentials
//!
//! Configuration is stored at `~/.config/replay/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::progress::ProgressThresholds;
use crate::week::{timezone_or, TimezoneResolver, DEFAULT_TIMEZONE};

/// Report dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// A claim older than this is considered abandoned.
    #[serde(default = "default_claim_timeout_minutes")]
    pub claim_timeout_minutes: u32,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

/// Push audience service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub app_id: String,
    /// REST API key. `REPLAY_ONESIGNAL_API_KEY` takes precedence.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/replay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_timezone_name")]
    pub default_timezone: String,
    #[serde(default)]
    pub thresholds: ProgressThresholds,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_timezone_name() -> String {
    DEFAULT_TIMEZONE.name().to_string()
}
fn default_claim_timeout_minutes() -> u32 {
    15
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_api_base() -> String {
    "https://api.onesignal.com".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl ReportsConfig {
    pub fn claim_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.claim_timeout_minutes))
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            claim_timeout_minutes: default_claim_timeout_minutes(),
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
            api_key: String::new(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone_name(),
            thresholds: ProgressThresholds::default(),
            reports: ReportsConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl NotificationsConfig {
    /// Apply `REPLAY_ONESIGNAL_APP_ID` / `REPLAY_ONESIGNAL_API_KEY` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(app_id) = std::env::var("REPLAY_ONESIGNAL_APP_ID") {
            self.app_id = app_id;
        }
        if let Ok(key) = std::env::var("REPLAY_ONESIGNAL_API_KEY") {
            self.api_key = key;
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && !self.app_id.is_empty() && !self.api_key.is_empty()
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/replay"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or `default_timezone` is not an IANA name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        crate::week::parse_timezone(&updated.default_timezone).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        *self = updated;
        Ok(())
    }

    /// Resolver seeded with `default_timezone` (falls back to New York if
    /// the file holds an unknown name).
    pub fn timezone_resolver(&self) -> TimezoneResolver {
        TimezoneResolver::new(timezone_or(Some(&self.default_timezone), DEFAULT_TIMEZONE))
    }
}
