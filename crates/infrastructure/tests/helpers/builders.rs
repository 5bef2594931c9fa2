#![allow(dead_code)]
use dnsfilter_domain::{UpstreamConfig, UpstreamProtocol};
use std::net::SocketAddr;
use std::time::Duration;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ConfigBuilder;

impl ConfigBuilder {
    pub fn udp(addr: SocketAddr) -> UpstreamConfig {
        Self::build(addr, UpstreamProtocol::Udp, None)
    }

    pub fn tcp(addr: SocketAddr) -> UpstreamConfig {
        Self::build(addr, UpstreamProtocol::Tcp, None)
    }

    /// DoT against `localhost`, matching [`super::TlsFixture`].
    pub fn dot(addr: SocketAddr) -> UpstreamConfig {
        UpstreamConfig::new("localhost", addr, UpstreamProtocol::Dot, TEST_TIMEOUT, None)
            .expect("valid DoT config")
    }

    pub fn doh(addr: SocketAddr) -> UpstreamConfig {
        Self::doh_with_endpoint(addr, "https://localhost/dns-query")
    }

    pub fn doh_with_endpoint(addr: SocketAddr, endpoint: &str) -> UpstreamConfig {
        UpstreamConfig::new(
            "localhost",
            addr,
            UpstreamProtocol::Doh,
            TEST_TIMEOUT,
            Some(endpoint),
        )
        .expect("valid DoH config")
    }

    pub fn with_timeout(config: &UpstreamConfig, timeout: Duration) -> UpstreamConfig {
        UpstreamConfig::new(
            config.host(),
            config.addr(),
            config.protocol(),
            timeout,
            config.endpoint(),
        )
        .expect("valid config")
    }

    fn build(
        addr: SocketAddr,
        protocol: UpstreamProtocol,
        endpoint: Option<&str>,
    ) -> UpstreamConfig {
        UpstreamConfig::new(addr.ip().to_string(), addr, protocol, TEST_TIMEOUT, endpoint)
            .expect("valid config")
    }
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Query for `example.com A` with the given id.
    pub fn a_record(id: u16) -> Vec<u8> {
        let mut query = Vec::with_capacity(29);
        query.extend_from_slice(&id.to_be_bytes());
        query.extend_from_slice(&[0x01, 0x00]);
        query.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        query.extend_from_slice(b"\x07example\x03com\x00");
        query.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        query
    }

    pub fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }
}
