use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::sheets::DEFAULT_SHEET_NAME;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 60;
/// One week.
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    fn defaulted(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }
}

/// Google Sheets sync configuration
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    /// Minutes between scheduled sync cycles
    pub interval_minutes: ConfigValue<u64>,
    /// Path to the Google service-account key file (JSON)
    pub service_account_path: ConfigValue<Option<PathBuf>>,
    /// Target spreadsheet id
    pub spreadsheet_id: ConfigValue<Option<String>>,
    /// Sheet (tab) that receives the rows
    pub sheet_name: ConfigValue<String>,
}

impl SyncConfig {
    /// Returns true if sync is configured (has both a key file and a spreadsheet id)
    pub fn is_configured(&self) -> bool {
        self.service_account_path.value.is_some() && self.spreadsheet_id.value.is_some()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: ConfigValue::defaulted(DEFAULT_SYNC_INTERVAL_MINUTES),
            service_account_path: ConfigValue::defaulted(None),
            spreadsheet_id: ConfigValue::defaulted(None),
            sheet_name: ConfigValue::defaulted(DEFAULT_SHEET_NAME.to_string()),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Directory for uploaded meter photos
    pub upload_dir: ConfigValue<PathBuf>,
    /// HTTP port for the server
    pub port: ConfigValue<u16>,
    /// Origin allowed by CORS
    pub cors_origin: ConfigValue<String>,
    /// Optional directory with a built web UI
    pub static_dir: ConfigValue<Option<PathBuf>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    upload_dir: Option<PathBuf>,
    port: Option<u16>,
    cors_origin: Option<String>,
    static_dir: Option<PathBuf>,
    sync: Option<SyncFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFile {
    interval_minutes: Option<u64>,
    service_account_path: Option<PathBuf>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
}

fn resolve_relative(config_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path.parent().map(|p| p.join(&path)).unwrap_or(path)
    } else {
        path
    }
}

fn parse_env<T: FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw))
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with a custom environment lookup.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = Self::default_data_dir();

        // Start with defaults
        let mut database_path = ConfigValue::defaulted(data_dir.join("meterlog.db"));
        let mut upload_dir = ConfigValue::defaulted(data_dir.join("uploads"));
        let mut port = ConfigValue::defaulted(DEFAULT_PORT);
        let mut cors_origin = ConfigValue::defaulted(DEFAULT_CORS_ORIGIN.to_string());
        let mut static_dir = ConfigValue::defaulted(None);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve_relative(&path, db_path), ConfigSource::File);
            }
            if let Some(dir) = file_config.upload_dir {
                upload_dir = ConfigValue::new(resolve_relative(&path, dir), ConfigSource::File);
            }
            if let Some(p) = file_config.port {
                port = ConfigValue::new(p, ConfigSource::File);
            }
            if let Some(origin) = file_config.cors_origin {
                cors_origin = ConfigValue::new(origin, ConfigSource::File);
            }
            if let Some(dir) = file_config.static_dir {
                static_dir = ConfigValue::new(Some(resolve_relative(&path, dir)), ConfigSource::File);
            }
            if let Some(file_sync) = file_config.sync {
                if let Some(minutes) = file_sync.interval_minutes {
                    sync.interval_minutes = ConfigValue::new(minutes, ConfigSource::File);
                }
                if let Some(key_path) = file_sync.service_account_path {
                    sync.service_account_path =
                        ConfigValue::new(Some(resolve_relative(&path, key_path)), ConfigSource::File);
                }
                if let Some(id) = file_sync.spreadsheet_id {
                    sync.spreadsheet_id = ConfigValue::new(Some(id), ConfigSource::File);
                }
                if let Some(name) = file_sync.sheet_name {
                    sync.sheet_name = ConfigValue::new(name, ConfigSource::File);
                }
            }
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("METERLOG_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(dir) = env("METERLOG_UPLOAD_DIR") {
            upload_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Some(raw) = env("METERLOG_PORT") {
            port = ConfigValue::new(parse_env("METERLOG_PORT", raw)?, ConfigSource::Environment);
        }
        if let Some(origin) = env("METERLOG_CORS_ORIGIN") {
            cors_origin = ConfigValue::new(origin, ConfigSource::Environment);
        }
        if let Some(dir) = env("METERLOG_STATIC_DIR") {
            static_dir = ConfigValue::new(Some(PathBuf::from(dir)), ConfigSource::Environment);
        }
        // Sync env var overrides
        if let Some(raw) = env("METERLOG_SYNC_INTERVAL_MINUTES") {
            sync.interval_minutes = ConfigValue::new(
                parse_env("METERLOG_SYNC_INTERVAL_MINUTES", raw)?,
                ConfigSource::Environment,
            );
        }
        if let Some(key_path) = env("METERLOG_GOOGLE_SERVICE_ACCOUNT_PATH") {
            sync.service_account_path =
                ConfigValue::new(Some(PathBuf::from(key_path)), ConfigSource::Environment);
        }
        if let Some(id) = env("METERLOG_GOOGLE_SHEET_ID") {
            sync.spreadsheet_id = ConfigValue::new(Some(id), ConfigSource::Environment);
        }
        if let Some(name) = env("METERLOG_GOOGLE_SHEET_NAME") {
            sync.sheet_name = ConfigValue::new(name, ConfigSource::Environment);
        }

        let minutes = sync.interval_minutes.value;
        if minutes == 0 || minutes > MAX_SYNC_INTERVAL_MINUTES {
            return Err(ConfigError::InvalidValue(
                "sync.interval_minutes".to_string(),
                minutes.to_string(),
            ));
        }

        Ok(Self {
            database_path,
            upload_dir,
            port,
            cors_origin,
            static_dir,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/meterlog/
    /// - macOS: ~/Library/Application Support/meterlog/
    /// - Windows: %APPDATA%/meterlog/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meterlog")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/meterlog/
    /// - macOS: ~/Library/Application Support/meterlog/
    /// - Windows: %APPDATA%/meterlog/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meterlog")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
