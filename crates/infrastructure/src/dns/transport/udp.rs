//! UDP transport (RFC 1035 §4.2.1).
//!
//! Messages go out unframed. Each call uses its own connected socket on an
//! ephemeral port, so the kernel drops datagrams from any other source.

use super::DnsTransport;
use async_trait::async_trait;
use dnsfilter_domain::{UpstreamError, UpstreamProtocol};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_MESSAGE_SIZE: usize = 65_507;

/// Receive buffer one byte larger than any datagram the kernel can hand over,
/// so an oversized reply is detected rather than silently truncated.
const RECV_BUFFER_SIZE: usize = 65_536;

pub struct UdpTransport {
    server_addr: SocketAddr,
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            server_addr,
            timeout,
        }
    }

    fn bind_socket(&self) -> io::Result<UdpSocket> {
        let (domain, bind_addr) = if self.server_addr.is_ipv4() {
            (
                Domain::IPV4,
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            )
        } else {
            (
                Domain::IPV6,
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
            )
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket)
    }

    fn unreachable(&self, reason: impl Into<String>) -> UpstreamError {
        UpstreamError::Unreachable {
            server: self.server_addr.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError> {
        if query.len() > MAX_UDP_MESSAGE_SIZE {
            return Err(UpstreamError::QueryTooLarge {
                size: query.len(),
                max: MAX_UDP_MESSAGE_SIZE,
            });
        }

        let socket = self
            .bind_socket()
            .map_err(|e| self.unreachable(format!("failed to bind UDP socket: {}", e)))?;

        socket
            .connect(self.server_addr)
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        let bytes_sent = tokio::time::timeout(self.timeout, socket.send(query))
            .await
            .map_err(|_| self.unreachable("timed out sending query"))?
            .map_err(|e| self.unreachable(e.to_string()))?;

        debug!(server = %self.server_addr, bytes_sent, "UDP query sent");

        let mut recv_buf = vec![0u8; RECV_BUFFER_SIZE];
        let bytes_received = tokio::time::timeout(self.timeout, socket.recv(&mut recv_buf))
            .await
            .map_err(|_| UpstreamError::NoResponse {
                server: self.server_addr.to_string(),
            })?
            .map_err(|e| self.unreachable(format!("failed to receive response: {}", e)))?;

        if bytes_received > answer.len() {
            return Err(UpstreamError::BufferTooSmall {
                size: bytes_received,
                capacity: answer.len(),
            });
        }

        answer[..bytes_received].copy_from_slice(&recv_buf[..bytes_received]);

        debug!(server = %self.server_addr, bytes_received, "UDP response received");

        Ok(bytes_received)
    }

    fn protocol(&self) -> UpstreamProtocol {
        UpstreamProtocol::Udp
    }
}
