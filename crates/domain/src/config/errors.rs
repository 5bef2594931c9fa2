/// Errors produced while turning user configuration into upstream servers.
///
/// A `ConfigError` is fatal for the entry it was raised for: the entry is
/// skipped, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port '{0}'")]
    InvalidPort(String),

    #[error("Invalid protocol '{0}'")]
    InvalidProtocol(String),

    #[error("Endpoint URL not defined for DNS over HTTPS (DoH)")]
    MissingEndpoint,

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid host in '{0}'")]
    InvalidHost(String),

    #[error("Host resolution failed for '{host}': {reason}")]
    HostResolution { host: String, reason: String },

    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to write config file {0}: {1}")]
    FileWrite(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

