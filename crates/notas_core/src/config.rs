//! Application configuration.
//!
//! # Responsibility
//! - Resolve storage mode, paths, log level and backend credentials from
//!   environment variables or a JSON document.
//!
//! # Invariants
//! - Backend values left blank or at their template placeholders count as
//!   "not configured"; the app then runs in local mode.
//! - Loading never touches the filesystem.

use crate::logging::default_log_level;
use crate::service::draft::DEFAULT_AUTOSAVE_DELAY;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_ENVIRONMENT: &str = "NOTAS_ENV";
pub const ENV_DB_PATH: &str = "NOTAS_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NOTAS_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NOTAS_LOG_DIR";
pub const ENV_BACKEND_URL: &str = "NOTAS_BACKEND_URL";
pub const ENV_BACKEND_ANON_KEY: &str = "NOTAS_BACKEND_ANON_KEY";
pub const ENV_DRAFT_AUTOSAVE_SECS: &str = "NOTAS_DRAFT_AUTOSAVE_SECS";

const URL_PLACEHOLDER: &str = "YOUR_SUPABASE_URL";
const ANON_KEY_PLACEHOLDER: &str = "YOUR_SUPABASE_ANON_KEY";
const DEFAULT_DB_FILE: &str = "notas.sqlite3";

/// Configuration loading error.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    InvalidNumber { key: &'static str, value: String },
    Json(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "unsupported environment `{value}`; expected development|production"
            ),
            Self::InvalidNumber { key, value } => {
                write!(f, "`{key}` must be a positive integer, got `{value}`")
            }
            Self::Json(err) => write!(f, "invalid configuration document: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Local hosts map to development, everything else to production.
    pub fn for_host(host: &str) -> Self {
        match host.trim().to_ascii_lowercase().as_str() {
            "localhost" | "127.0.0.1" | "::1" | "[::1]" => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(value.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Hosted backend coordinates.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl BackendConfig {
    /// Returns `None` unless both values are set and not placeholders.
    pub fn from_values(url: Option<&str>, anon_key: Option<&str>) -> Option<Self> {
        let url = configured(url, URL_PLACEHOLDER)?;
        let anon_key = configured(anon_key, ANON_KEY_PLACEHOLDER)?;
        Some(Self { url, anon_key })
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}

fn configured(value: Option<&str>, placeholder: &str) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value == placeholder {
        None
    } else {
        Some(value.to_string())
    }
}

/// Which authority owns the canonical note list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub db_path: PathBuf,
    pub log_level: String,
    /// `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub backend: Option<BackendConfig>,
    pub draft_autosave_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE),
            log_level: default_log_level().to_string(),
            log_dir: None,
            backend: None,
            draft_autosave_secs: DEFAULT_AUTOSAVE_DELAY.as_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    environment: Option<String>,
    db_path: Option<String>,
    log_level: Option<String>,
    log_dir: Option<String>,
    backend_url: Option<String>,
    backend_anon_key: Option<String>,
    draft_autosave_secs: Option<u64>,
}

impl AppConfig {
    /// Reads `NOTAS_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let draft_autosave_secs = match lookup(ENV_DRAFT_AUTOSAVE_SECS) {
            Some(raw) => Some(parse_positive(ENV_DRAFT_AUTOSAVE_SECS, &raw)?),
            None => None,
        };
        Self::from_raw(RawConfig {
            environment: lookup(ENV_ENVIRONMENT),
            db_path: lookup(ENV_DB_PATH),
            log_level: lookup(ENV_LOG_LEVEL),
            log_dir: lookup(ENV_LOG_DIR),
            backend_url: lookup(ENV_BACKEND_URL),
            backend_anon_key: lookup(ENV_BACKEND_ANON_KEY),
            draft_autosave_secs,
        })
    }

    /// Reads configuration from a JSON object with snake_case keys.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Self::from_raw(serde_json::from_str(raw)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let environment = match non_blank(raw.environment) {
            Some(value) => Environment::parse(&value)?,
            None => defaults.environment,
        };
        let draft_autosave_secs = match raw.draft_autosave_secs {
            Some(0) => {
                return Err(ConfigError::InvalidNumber {
                    key: ENV_DRAFT_AUTOSAVE_SECS,
                    value: "0".to_string(),
                })
            }
            Some(secs) => secs,
            None => defaults.draft_autosave_secs,
        };

        Ok(Self {
            environment,
            db_path: non_blank(raw.db_path)
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_level: non_blank(raw.log_level).unwrap_or(defaults.log_level),
            log_dir: non_blank(raw.log_dir).map(PathBuf::from),
            backend: BackendConfig::from_values(
                raw.backend_url.as_deref(),
                raw.backend_anon_key.as_deref(),
            ),
            draft_autosave_secs,
        })
    }

    pub fn storage_mode(&self) -> StorageMode {
        if self.backend.is_some() {
            StorageMode::Remote
        } else {
            StorageMode::Local
        }
    }

    pub fn draft_autosave_delay(&self) -> Duration {
        Duration::from_secs(self.draft_autosave_secs)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}
