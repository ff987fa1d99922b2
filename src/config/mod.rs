//! Application configuration
//!
//! Loaded from `CHATTER_*` environment variables, or from a TOML file:
//!
//! ```toml
//! api_url = "https://chat.example.com/api"
//! gateway = "http"
//! storage = "sqlite"
//! data_dir = "./data"
//! session_ttl_hours = 24
//! persist_chat = false
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which gateway implementation talks to the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Http,
    Mock,
}

impl FromStr for GatewayKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(GatewayKind::Http),
            "mock" => Ok(GatewayKind::Mock),
            other => Err(ConfigError::Validation(format!("Unknown gateway: {}", other))),
        }
    }
}

/// Where the session is kept between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StorageKind::Sqlite),
            "memory" => Ok(StorageKind::Memory),
            other => Err(ConfigError::Validation(format!("Unknown storage: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chat API, e.g. `http://localhost:3000/api`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub gateway: GatewayKind,

    #[serde(default)]
    pub storage: StorageKind,

    /// Directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How long a persisted session stays valid
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Save the conversation list on shutdown and reload it on start
    #[serde(default)]
    pub persist_chat: bool,

    /// Artificial delay of the mock gateway
    #[serde(default)]
    pub mock_latency_ms: u64,
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_session_ttl_hours() -> i64 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            gateway: GatewayKind::default(),
            storage: StorageKind::default(),
            data_dir: default_data_dir(),
            session_ttl_hours: default_session_ttl_hours(),
            persist_chat: false,
            mock_latency_ms: 0,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();
        let config = Self {
            api_url: env::var("CHATTER_API_URL").unwrap_or(defaults.api_url),
            gateway: match env::var("CHATTER_GATEWAY") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.gateway,
            },
            storage: match env::var("CHATTER_STORAGE") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.storage,
            },
            data_dir: env::var("CHATTER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            session_ttl_hours: env::var("CHATTER_SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.session_ttl_hours),
            persist_chat: env::var("CHATTER_PERSIST_CHAT")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.persist_chat),
            mock_latency_ms: env::var("CHATTER_MOCK_LATENCY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.mock_latency_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Validation("api_url must not be empty".to_string()));
        }
        if self.session_ttl_hours <= 0 {
            return Err(ConfigError::Validation(
                "session_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chatter.db")
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
