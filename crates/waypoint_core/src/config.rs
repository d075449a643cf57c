//! Runtime configuration resolved from the environment.
//!
//! # Responsibility
//! - Resolve backend URL, session database path, HTTP timeout and logging
//!   settings from `WAYPOINT_*` variables.
//!
//! # Invariants
//! - Blank values fall back to defaults.
//! - Malformed values are reported, never silently replaced.
//! - `api_base_url` never ends with `/`.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_URL: &str = "WAYPOINT_API_URL";
pub const ENV_DB_PATH: &str = "WAYPOINT_DB_PATH";
pub const ENV_HTTP_TIMEOUT_MS: &str = "WAYPOINT_HTTP_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "WAYPOINT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "WAYPOINT_LOG_DIR";

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(5000);
const SESSION_DB_FILE_NAME: &str = "waypoint_session.sqlite3";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidUrl { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got `{value}`")
            }
            Self::InvalidUrl { key, value } => {
                write!(f, "{key} must start with http:// or https://, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Resolved core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub session_db_path: PathBuf,
    pub http_timeout: Duration,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            session_db_path: std::env::temp_dir().join(SESSION_DB_FILE_NAME),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, used by tests and embedders.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = read(ENV_API_URL) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl {
                    key: ENV_API_URL,
                    value: url,
                });
            }
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = read(ENV_DB_PATH) {
            config.session_db_path = PathBuf::from(path);
        }
        if let Some(raw) = read(ENV_HTTP_TIMEOUT_MS) {
            let millis = raw
                .parse::<u64>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidNumber {
                    key: ENV_HTTP_TIMEOUT_MS,
                    value: raw.clone(),
                })?;
            config.http_timeout = Duration::from_millis(millis);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = read(ENV_LOG_DIR).map(PathBuf::from);

        Ok(config)
    }
}
