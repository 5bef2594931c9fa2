use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    /// Upstream definitions, `host[::port[::protocol[::endpoint]]]`, in
    /// fallback order.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long an idle pooled TCP/TLS connection may be kept for reuse.
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl UpstreamSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            timeout_ms: default_timeout_ms(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_servers() -> Vec<String> {
    vec![
        "1.1.1.1::853::DOT".to_string(),
        "8.8.8.8::53::UDP".to_string(),
    ]
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_pool_idle_timeout_secs() -> u64 {
    30
}

fn default_max_idle_per_host() -> usize {
    4
}
