/// Service configuration
///
/// Loaded from a TOML file where every key is optional. A `.env` file, if
/// present, is loaded first; `DATABASE_URL` overrides `[database].url`.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_PATH: &str = "./meteo.toml";

// ---------------------------------------------------------------------------
// Configuration tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// WebSocket port of the live push service.
    pub push_port: u16,
    /// Port of the HTTP read API.
    pub http_port: u16,
    /// Minimum delay between two served messages on one push connection.
    /// 0 disables the limit.
    pub min_message_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            push_port: 8888,
            http_port: 8080,
            min_message_interval_ms: 0,
        }
    }
}

impl ServerConfig {
    pub fn push_addr(&self) -> String {
        format!("{}:{}", self.host, self.push_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn min_message_interval(&self) -> Duration {
        Duration::from_millis(self.min_message_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://client@127.0.0.1/station_meteo".to_string(),
            pool_size: 8,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl LoggingConfig {
    pub fn min_level(&self) -> Result<LogLevel, ConfigError> {
        self.level.parse().map_err(ConfigError::Invalid)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    Io(std::io::Error),
    /// The file is not valid TOML or has wrongly typed values.
    Parse(toml::de::Error),
    /// Values parsed but make no sense together.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Cannot read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "Cannot parse configuration: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ServiceConfig {
    /// Reads `path` (defaults apply when the file does not exist), then
    /// applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
            Self::from_toml(&text)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid("database.pool_size must be at least 1".to_string()));
        }
        if self.server.push_port == self.server.http_port {
            return Err(ConfigError::Invalid(format!(
                "server.push_port and server.http_port are both {}",
                self.server.push_port
            )));
        }
        self.logging.min_level()?;
        Ok(())
    }
}
