use crate::config::ConfigError;
use crate::dns_protocol::{ServerSpec, UpstreamProtocol, SPEC_DELIMITER};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Validated definition of one upstream resolver.
///
/// Immutable once built. `endpoint` is present exactly when the protocol is
/// DoH; every constructor enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamConfig {
    host: Arc<str>,
    addr: SocketAddr,
    protocol: UpstreamProtocol,
    timeout: Duration,
    endpoint: Option<Arc<str>>,
}

impl UpstreamConfig {
    /// `host` is the name the upstream was configured with. It is kept as the
    /// TLS server name, so it may equal the textual form of `addr`.
    pub fn new(
        host: impl Into<Arc<str>>,
        addr: SocketAddr,
        protocol: UpstreamProtocol,
        timeout: Duration,
        endpoint: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let endpoint = match protocol {
            UpstreamProtocol::Doh => match endpoint.map(str::trim) {
                Some(e) if !e.is_empty() => Some(Arc::from(e)),
                _ => return Err(ConfigError::MissingEndpoint),
            },
            _ => None,
        };

        Ok(Self {
            host: host.into(),
            addr,
            protocol,
            timeout,
            endpoint,
        })
    }

    /// Combines a parsed spec with the address its host resolved to.
    pub fn from_spec(spec: &ServerSpec, ip: IpAddr, timeout: Duration) -> Result<Self, ConfigError> {
        Self::new(
            spec.host.as_str(),
            SocketAddr::new(ip, spec.port),
            spec.protocol,
            timeout,
            spec.endpoint.as_deref(),
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn protocol(&self) -> UpstreamProtocol {
        self.protocol
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl fmt::Display for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr.ip() {
            IpAddr::V4(ip) => write!(f, "{}", ip)?,
            IpAddr::V6(ip) => write!(f, "[{}]", ip)?,
        }
        write!(
            f,
            "{SPEC_DELIMITER}{}{SPEC_DELIMITER}{}",
            self.addr.port(),
            self.protocol
        )
    }
}
