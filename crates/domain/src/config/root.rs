use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use super::upstream::UpstreamSettings;
use crate::dns_protocol::ServerSpec;

const LOCAL_CONFIG_PATH: &str = "dnsfilter.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/dnsfilter/config.toml";

/// Largest payload a DNS answer can have on any supported transport.
const MAX_ANSWER_BUFFER_SIZE: usize = 65_535;
const MIN_ANSWER_BUFFER_SIZE: usize = 512;

/// Main configuration structure for dnsfilter
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. dnsfilter.toml in current directory
    /// 3. /etc/dnsfilter/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::get_config_path() {
                Some(found) => Self::from_file(&found)?,
                None => Self::default(),
            },
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(listen) = overrides.listen {
            self.server.listen = listen;
        }
        if let Some(servers) = overrides.upstream_servers {
            if !servers.is_empty() {
                self.upstream.servers = servers;
            }
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.upstream.timeout_ms = timeout_ms;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Checks the configuration as a whole.
    ///
    /// Individual upstream entries are only checked syntactically; an entry
    /// that fails here is reported but host resolution happens later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid listen address '{}': {}",
                self.server.listen, e
            ))
        })?;

        if !(MIN_ANSWER_BUFFER_SIZE..=MAX_ANSWER_BUFFER_SIZE)
            .contains(&self.server.answer_buffer_size)
        {
            return Err(ConfigError::Validation(format!(
                "answer_buffer_size must be between {} and {}, got {}",
                MIN_ANSWER_BUFFER_SIZE, MAX_ANSWER_BUFFER_SIZE, self.server.answer_buffer_size
            )));
        }

        if self.upstream.servers.is_empty() {
            return Err(ConfigError::Validation(
                "No upstream servers configured".to_string(),
            ));
        }

        if self.upstream.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Upstream timeout cannot be 0".to_string(),
            ));
        }

        let valid = self
            .upstream
            .servers
            .iter()
            .filter(|s| s.parse::<ServerSpec>().is_ok())
            .count();
        if valid == 0 {
            return Err(ConfigError::Validation(
                "None of the configured upstream servers is valid".to_string(),
            ));
        }

        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }

    /// Get the path to the configuration file being used
    pub fn get_config_path() -> Option<String> {
        [LOCAL_CONFIG_PATH, SYSTEM_CONFIG_PATH]
            .into_iter()
            .find(|p| Path::new(p).exists())
            .map(str::to_string)
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub upstream_servers: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}
