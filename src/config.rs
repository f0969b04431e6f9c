use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::vsco::{CatalogConfig, DEFAULT_BASE_URL, Pagination, TransportConfig};

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Paths {
    pub download_directory: String,
    pub log_directory: String,
    /// Username to site id cache; empty disables it
    pub site_cache_file: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            download_directory: ".".to_string(),
            log_directory: "./logs".to_string(),
            site_cache_file: "vscoget-user-database.txt".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
    pub pagination: Pagination,
    pub page_size: usize,
    /// Number of the first page in offset mode
    pub first_page: usize,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            pagination: Pagination::Cursor,
            page_size: 30,
            first_page: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Pools {
    pub max_download_concurrency: usize,
}

impl Default for Pools {
    fn default() -> Self {
        Self {
            max_download_concurrency: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Rate {
    pub retry_count: usize,
    pub retry_delay_secs: u64,
}

impl Default for Rate {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Http {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub auth_token: String,
}

impl Default for Http {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            timeout_secs: transport.timeout_secs,
            user_agent: transport.user_agent,
            auth_token: transport.auth_token.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_terminal: bool,
    pub log_to_file: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_to_terminal: true,
            log_to_file: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Verifier {
    /// Zero-length local files do not count as downloaded
    pub refetch_empty_files: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub paths: Paths,
    pub api: Api,
    pub pools: Pools,
    pub rate: Rate,
    pub http: Http,
    pub logging: Logging,
    pub verifier: Verifier,
}

impl AppConfig {
    /// Load the config file, creating it with defaults if it is missing.
    ///
    /// An unparseable file is moved aside to `<name>.backup` and replaced
    /// with defaults.
    pub fn load(config_path: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            warn!("Config file not found: {}", config_path.display());
            let default_config = AppConfig::default();
            default_config.save(config_path)?;
            info!("Created {} with default values", config_path.display());
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", config_path.display(), e);
                info!("Backing up old config and creating new one with default values");

                let mut backup = config_path.as_os_str().to_owned();
                backup.push(".backup");
                if let Err(backup_err) = fs::rename(config_path, &backup) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                let default_config = AppConfig::default();
                if let Err(write_err) = default_config.save(config_path) {
                    error!("Failed to write new config file: {}", write_err);
                }
                Ok(default_config)
            }
        }
    }

    pub fn save(&self, config_path: impl AsRef<Path>) -> ConfigResult<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            pagination: self.api.pagination,
            page_size: self.api.page_size,
            first_page: self.api.first_page,
            retry_count: self.rate.retry_count,
            retry_delay: Duration::from_secs(self.rate.retry_delay_secs),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            user_agent: self.http.user_agent.clone(),
            auth_token: Some(self.http.auth_token.clone()).filter(|t| !t.is_empty()),
            timeout_secs: self.http.timeout_secs,
            ..TransportConfig::default()
        }
    }
}
