use super::transport::{create_transport, resolver, ConnectionPool, Transport};
use dnsfilter_domain::{ConfigError, ServerSpec, UpstreamConfig, UpstreamError, UpstreamProtocol};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A configured upstream resolver and the transport that reaches it.
///
/// Two servers are equal when they share address and port, whatever their
/// protocol: the same resolver reached over UDP and DoT is one upstream.
pub struct DnsServer {
    config: Arc<UpstreamConfig>,
    transport: Transport,
}

impl DnsServer {
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.addr()
    }

    pub fn protocol(&self) -> UpstreamProtocol {
        self.transport.protocol()
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError> {
        debug!(
            server = %self.config,
            query_len = query.len(),
            capacity = answer.len(),
            "Forwarding query upstream"
        );

        self.transport.resolve(query, answer).await
    }
}

impl PartialEq for DnsServer {
    fn eq(&self, other: &Self) -> bool {
        self.config.addr() == other.config.addr()
    }
}

impl Eq for DnsServer {}

impl Hash for DnsServer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.config.addr().hash(state);
    }
}

impl fmt::Display for DnsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config)
    }
}

impl fmt::Debug for DnsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsServer")
            .field("host", &self.config.host())
            .field("addr", &self.config.addr())
            .field("protocol", &self.protocol())
            .finish()
    }
}

/// Builds [`DnsServer`]s, handing every stream transport the same pool.
#[derive(Clone)]
pub struct DnsServerFactory {
    pool: Arc<ConnectionPool>,
}

impl DnsServerFactory {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn create(
        &self,
        protocol: UpstreamProtocol,
        address: IpAddr,
        port: u16,
        timeout: Duration,
        endpoint: Option<&str>,
    ) -> Result<DnsServer, ConfigError> {
        let config = UpstreamConfig::new(
            address.to_string(),
            SocketAddr::new(address, port),
            protocol,
            timeout,
            endpoint,
        )?;
        self.from_config(config)
    }

    pub fn from_config(&self, config: UpstreamConfig) -> Result<DnsServer, ConfigError> {
        let transport = create_transport(&config, self.pool.clone())?;

        debug!(server = %config, "Created upstream server");

        Ok(DnsServer {
            config: Arc::new(config),
            transport,
        })
    }

    /// Parses `spec`, resolves its host and builds the server.
    pub async fn from_spec(&self, spec: &str, timeout: Duration) -> Result<DnsServer, ConfigError> {
        let config = parse_upstream(spec, timeout).await?;
        self.from_config(config)
    }
}

/// Turns `host[::port[::protocol[::endpoint]]]` into an [`UpstreamConfig`].
///
/// The host lookup, when one is needed, is bounded by `timeout`.
pub async fn parse_upstream(spec: &str, timeout: Duration) -> Result<UpstreamConfig, ConfigError> {
    let parsed: ServerSpec = spec.parse()?;
    let addr = resolver::resolve_host(&parsed.host, parsed.port, timeout).await?;
    UpstreamConfig::from_spec(&parsed, addr.ip(), timeout)
}
