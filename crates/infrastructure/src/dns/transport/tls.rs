//! TLS plumbing shared by DNS-over-TLS (RFC 7858) and DNS-over-HTTPS.
//!
//! A single `ClientConfig` is built once and reused by every pooled
//! connection, which also lets rustls resume sessions across reconnects.

use dnsfilter_domain::ConfigError;
use rustls::pki_types::ServerName;
use std::sync::{Arc, LazyLock};

/// Shared TLS config trusting the webpki root set.
static SHARED_TLS_CONFIG: LazyLock<Arc<rustls::ClientConfig>> = LazyLock::new(|| {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
});

pub fn shared_client_config() -> Arc<rustls::ClientConfig> {
    SHARED_TLS_CONFIG.clone()
}

/// Name the upstream certificate is verified against (and sent as SNI).
///
/// IP literals, bracketed or not, become IP-address server names.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConfigError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string()).map_err(|e| {
        ConfigError::Validation(format!("Invalid TLS server name '{}': {}", host, e))
    })
}
