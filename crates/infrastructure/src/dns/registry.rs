use super::upstream::{DnsServer, DnsServerFactory};
use dnsfilter_domain::UpstreamError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered, de-duplicated set of upstream servers.
///
/// Transports never retry; falling back to the next upstream is done here.
#[derive(Default)]
pub struct UpstreamRegistry {
    servers: Vec<Arc<DnsServer>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `server` unless an equal one is already registered.
    /// Returns whether it was added.
    pub fn insert(&mut self, server: DnsServer) -> bool {
        if let Some(existing) = self.servers.iter().find(|s| s.as_ref() == &server) {
            info!(
                server = %server,
                kept = %existing,
                "Ignoring duplicate upstream"
            );
            return false;
        }

        self.servers.push(Arc::new(server));
        true
    }

    /// Builds a registry from upstream spec strings, in order.
    ///
    /// Entries that fail to parse or resolve are logged and skipped.
    pub async fn from_specs<S: AsRef<str>>(
        factory: &DnsServerFactory,
        specs: &[S],
        timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();

        for spec in specs {
            let spec = spec.as_ref();
            match factory.from_spec(spec, timeout).await {
                Ok(server) => {
                    registry.insert(server);
                }
                Err(e) => {
                    warn!(spec = %spec, error = %e, "Skipping invalid upstream");
                }
            }
        }

        info!(count = registry.len(), "Upstream servers configured");
        registry
    }

    pub fn servers(&self) -> &[Arc<DnsServer>] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Tries each upstream in order until one answers.
    ///
    /// Stops early on errors another upstream could not fix (the answer
    /// buffer or query size). Otherwise returns the last upstream's error.
    pub async fn resolve_with_fallback(
        &self,
        query: &[u8],
        answer: &mut [u8],
    ) -> Result<usize, UpstreamError> {
        let mut last_error = UpstreamError::NoUpstreamAvailable;

        for server in &self.servers {
            match server.resolve(query, answer).await {
                Ok(len) => {
                    debug!(server = %server, response_len = len, "Upstream answered");
                    return Ok(len);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(server = %server, error = %e, "Upstream failed, trying next");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
