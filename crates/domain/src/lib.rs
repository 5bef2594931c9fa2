//! dnsfilter domain layer: upstream definitions, configuration and errors.
pub mod config;
pub mod dns_protocol;
pub mod errors;
pub mod upstream;

pub use config::{CliOverrides, Config, ConfigError};
pub use dns_protocol::{ServerSpec, UpstreamProtocol, DEFAULT_PORT, SPEC_DELIMITER};
pub use errors::UpstreamError;
pub use upstream::UpstreamConfig;
