pub mod registry;
pub mod transport;
pub mod upstream;

pub use registry::UpstreamRegistry;
pub use transport::{
    create_transport, ConnectionPool, DnsTransport, HttpsTransport, PoolStats, StreamTransport,
    Transport, UdpTransport,
};
pub use upstream::{parse_upstream, DnsServer, DnsServerFactory};
