use dnsfilter_domain::ConfigError;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Resolves a hostname to all its IP addresses (IPv4 + IPv6).
pub async fn resolve_all(
    hostname: &str,
    port: u16,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, ConfigError> {
    let failed = |reason: String| ConfigError::HostResolution {
        host: hostname.to_string(),
        reason,
    };

    let addrs_iter = tokio::time::timeout(timeout, tokio::net::lookup_host((hostname, port)))
        .await
        .map_err(|_| failed(format!("timed out after {}ms", timeout.as_millis())))?
        .map_err(|e| failed(e.to_string()))?;

    let addrs: Vec<SocketAddr> = addrs_iter.collect();

    if addrs.is_empty() {
        return Err(failed("no addresses found".to_string()));
    }

    Ok(addrs)
}

/// Resolves `host` to the first address the system resolver returns.
/// IP literals (bracketed or not) are returned without a lookup.
pub async fn resolve_host(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<SocketAddr, ConfigError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs = resolve_all(bare, port, timeout).await?;
    Ok(addrs[0])
}
