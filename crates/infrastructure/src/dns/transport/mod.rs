pub mod conn_pool;
pub mod https;
pub mod resolver;
pub mod tcp;
pub mod tls;
pub mod udp;

use async_trait::async_trait;
use dnsfilter_domain::{ConfigError, UpstreamConfig, UpstreamError, UpstreamProtocol};
use std::sync::Arc;

pub use conn_pool::{ConnectionPool, PoolStats, PooledConnection, PooledStream};
pub use https::HttpsTransport;
pub use tcp::StreamTransport;
pub use udp::UdpTransport;

/// One way of exchanging a DNS message with an upstream.
///
/// `resolve` sends `query`, writes the reply to the start of `answer` and
/// returns its length. On error `answer` is left untouched. Exactly one
/// attempt is made; retrying elsewhere is up to the caller.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError>;

    fn protocol(&self) -> UpstreamProtocol;

    fn protocol_name(&self) -> &'static str {
        self.protocol().as_str()
    }
}

pub enum Transport {
    Udp(UdpTransport),
    /// TCP or DoT.
    Stream(StreamTransport),
    Https(HttpsTransport),
}

impl Transport {
    pub async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError> {
        match self {
            Self::Udp(t) => DnsTransport::resolve(t, query, answer).await,
            Self::Stream(t) => DnsTransport::resolve(t, query, answer).await,
            Self::Https(t) => DnsTransport::resolve(t, query, answer).await,
        }
    }

    pub fn protocol(&self) -> UpstreamProtocol {
        match self {
            Self::Udp(t) => t.protocol(),
            Self::Stream(t) => t.protocol(),
            Self::Https(t) => t.protocol(),
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        self.protocol().as_str()
    }
}

/// Builds the transport for `config`. Stream and HTTPS transports share
/// connections through `pool`.
pub fn create_transport(
    config: &UpstreamConfig,
    pool: Arc<ConnectionPool>,
) -> Result<Transport, ConfigError> {
    match config.protocol() {
        UpstreamProtocol::Udp => Ok(Transport::Udp(UdpTransport::new(
            config.addr(),
            config.timeout(),
        ))),
        UpstreamProtocol::Tcp => Ok(Transport::Stream(StreamTransport::tcp(
            config.addr(),
            config.timeout(),
            pool,
        ))),
        UpstreamProtocol::Dot => Ok(Transport::Stream(StreamTransport::tls(
            config.addr(),
            config.host(),
            config.timeout(),
            pool,
        )?)),
        UpstreamProtocol::Doh => Ok(Transport::Https(HttpsTransport::new(config, pool)?)),
    }
}
