//! Configuration management for Reelgate services

use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default JSONBin v3 collection endpoint
pub const DEFAULT_JSONBIN_URL: &str = "https://api.jsonbin.io/v3/b";

/// 250 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 250 * 1024 * 1024;

/// Remote record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecordStoreConfig {
    pub base_url: String,
    pub bin_id: String,
    pub master_key: String,
    pub timeout_secs: u64,
}

impl RecordStoreConfig {
    /// Full URL of the license document
    pub fn document_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.bin_id)
    }
}

/// External transform configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    pub ffmpeg_path: String,
    pub max_upload_bytes: u64,
    pub timeout_secs: u64,
    /// Parent directory for per-request scratch space; system temp when unset
    pub work_dir: Option<PathBuf>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            timeout_secs: 900,
            work_dir: None,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub record_store: Option<RecordStoreConfig>,
    pub transform: TransformConfig,
    pub server: ServerConfig,
    pub admin_token: Option<String>,
    pub default_duration_days: u32,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        // The remote store needs both the bin and its key
        let record_store = match (var("JSONBIN_BIN_ID"), var("JSONBIN_MASTER_KEY")) {
            (Some(bin_id), Some(master_key)) => Some(RecordStoreConfig {
                base_url: var("JSONBIN_URL").unwrap_or_else(|| DEFAULT_JSONBIN_URL.to_string()),
                bin_id,
                master_key,
                timeout_secs: parse_or(&var, "STORE_TIMEOUT_SECS", 10)?,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Message(
                    "JSONBIN_BIN_ID and JSONBIN_MASTER_KEY must be set together".to_string(),
                ))
            }
        };

        let defaults = TransformConfig::default();
        let transform = TransformConfig {
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            max_upload_bytes: parse_or(&var, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            timeout_secs: parse_or(&var, "TRANSFORM_TIMEOUT_SECS", defaults.timeout_secs)?,
            work_dir: var("WORK_DIR").map(PathBuf::from),
        };

        let server = ServerConfig {
            host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "SERVER_PORT", 8000)?,
        };

        let default_duration_days: u32 = parse_or(&var, "DEFAULT_DURATION_DAYS", 30)?;
        if default_duration_days == 0 {
            return Err(ConfigError::Message(
                "DEFAULT_DURATION_DAYS must be positive".to_string(),
            ));
        }

        Ok(Self {
            record_store,
            transform,
            server,
            admin_token: var("ADMIN_TOKEN"),
            default_duration_days,
            log_level: Some(var("LOG_LEVEL").unwrap_or_else(|| "info".to_string())),
            log_format: var("LOG_FORMAT"),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// True when logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        matches!(self.log_format.as_deref(), Some(format) if format.eq_ignore_ascii_case("json"))
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::Message(format!("{} has an invalid value: {}", name, raw))
        }),
        None => Ok(default),
    }
}
