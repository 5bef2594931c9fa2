use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field separator of an upstream definition: `host::port::protocol::endpoint`.
pub const SPEC_DELIMITER: &str = "::";

/// Port used when an upstream definition omits it, whatever the protocol.
pub const DEFAULT_PORT: u16 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpstreamProtocol {
    #[default]
    Udp,
    Tcp,
    Dot,
    Doh,
}

impl UpstreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::Dot => "DOT",
            Self::Doh => "DOH",
        }
    }

    pub fn uses_tls(&self) -> bool {
        matches!(self, Self::Dot | Self::Doh)
    }

    /// Port the protocol is conventionally served on (RFC 1035, 7858, 8484).
    pub fn well_known_port(&self) -> u16 {
        match self {
            Self::Udp | Self::Tcp => 53,
            Self::Dot => 853,
            Self::Doh => 443,
        }
    }
}

impl FromStr for UpstreamProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UDP" => Ok(Self::Udp),
            "TCP" => Ok(Self::Tcp),
            "DOT" => Ok(Self::Dot),
            "DOH" => Ok(Self::Doh),
            _ => Err(ConfigError::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for UpstreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Textual upstream definition, `host[::port[::protocol[::endpoint]]]`.
///
/// Parsing is purely syntactic; turning `host` into an address is done by the
/// infrastructure layer. IPv6 hosts may be bracketed (`[2001:db8::1]::53`)
/// because the field delimiter is otherwise ambiguous with IPv6 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub host: String,
    pub port: u16,
    pub protocol: UpstreamProtocol,
    pub endpoint: Option<String>,
}

impl ServerSpec {
    fn split_host(s: &str) -> Result<(&str, Option<&str>), ConfigError> {
        if let Some(rest) = s.strip_prefix('[') {
            let end = rest
                .find(']')
                .ok_or_else(|| ConfigError::InvalidHost(s.to_string()))?;
            let host = &rest[..end];
            let after = &rest[end + 1..];
            if after.is_empty() {
                return Ok((host, None));
            }
            return match after.strip_prefix(SPEC_DELIMITER) {
                Some(fields) => Ok((host, Some(fields))),
                None => Err(ConfigError::InvalidPort(after.to_string())),
            };
        }

        Ok(match s.split_once(SPEC_DELIMITER) {
            Some((host, fields)) => (host, Some(fields)),
            None => (s, None),
        })
    }
}

impl FromStr for ServerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, fields) = Self::split_host(s)?;

        if host.is_empty() {
            return Err(ConfigError::InvalidHost(s.to_string()));
        }

        // The endpoint is the remainder, so a URL containing "::" survives.
        let mut fields: Vec<&str> = fields
            .map(|f| f.splitn(3, SPEC_DELIMITER).collect())
            .unwrap_or_default();
        while fields.last().is_some_and(|f| f.trim().is_empty()) {
            fields.pop();
        }

        let port = match fields.first() {
            Some(token) => token
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(token.to_string()))?,
            None => DEFAULT_PORT,
        };

        let protocol = match fields.get(1) {
            Some(token) => token.parse::<UpstreamProtocol>()?,
            None => UpstreamProtocol::default(),
        };

        let endpoint = fields.get(2).map(|e| e.trim().to_string());

        if protocol == UpstreamProtocol::Doh && endpoint.is_none() {
            return Err(ConfigError::MissingEndpoint);
        }

        Ok(Self {
            host: host.trim().to_string(),
            port,
            protocol,
            endpoint,
        })
    }
}

impl fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        write!(f, "{SPEC_DELIMITER}{}{SPEC_DELIMITER}{}", self.port, self.protocol)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, "{SPEC_DELIMITER}{}", endpoint)?;
        }
        Ok(())
    }
}
