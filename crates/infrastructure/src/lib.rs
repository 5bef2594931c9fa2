//! Upstream resolution for dnsfilter: UDP, TCP, DNS-over-TLS and
//! DNS-over-HTTPS transports behind one `resolve` call, plus the connection
//! pool and server registry they share.
pub mod dns;
pub mod http;
