//! TCP and DNS-over-TLS transport (RFC 1035 §4.2.2, RFC 7858).
//!
//! Both use the same framing: a 2-byte big-endian length followed by the
//! message. Connections come from the shared [`ConnectionPool`]; a
//! connection goes back to the pool only after a complete exchange.

use super::conn_pool::ConnectionPool;
use super::{tls, DnsTransport};
use async_trait::async_trait;
use dnsfilter_domain::{ConfigError, UpstreamError, UpstreamProtocol};
use rustls::pki_types::ServerName;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Largest message expressible with the 2-byte length prefix.
pub const MAX_TCP_MESSAGE_SIZE: usize = u16::MAX as usize;

pub struct StreamTransport {
    server_addr: SocketAddr,
    /// `Some` for DoT.
    server_name: Option<ServerName<'static>>,
    timeout: Duration,
    pool: Arc<ConnectionPool>,
}

impl StreamTransport {
    pub fn tcp(server_addr: SocketAddr, timeout: Duration, pool: Arc<ConnectionPool>) -> Self {
        Self {
            server_addr,
            server_name: None,
            timeout,
            pool,
        }
    }

    /// DoT transport verifying the upstream certificate against `tls_host`.
    pub fn tls(
        server_addr: SocketAddr,
        tls_host: &str,
        timeout: Duration,
        pool: Arc<ConnectionPool>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            server_addr,
            server_name: Some(tls::server_name(tls_host)?),
            timeout,
            pool,
        })
    }

    pub fn uses_tls(&self) -> bool {
        self.server_name.is_some()
    }

    async fn exchange<S>(
        &self,
        stream: &mut S,
        query: &[u8],
        answer: &mut [u8],
    ) -> Result<usize, UpstreamError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server = self.server_addr.to_string();

        tokio::time::timeout(self.timeout, send_with_length_prefix(stream, query))
            .await
            .map_err(|_| UpstreamError::Unreachable {
                server: server.clone(),
                reason: "timed out sending query".to_string(),
            })?
            .map_err(|e| UpstreamError::Unreachable {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            server = %self.server_addr,
            message_len = query.len(),
            tls = self.uses_tls(),
            "Stream query sent"
        );

        let response_len = tokio::time::timeout(
            self.timeout,
            read_with_length_prefix(stream, answer, &server),
        )
        .await
        .map_err(|_| UpstreamError::NoResponse {
            server: server.clone(),
        })??;

        debug!(
            server = %self.server_addr,
            response_len,
            "Stream response received"
        );

        Ok(response_len)
    }
}

#[async_trait]
impl DnsTransport for StreamTransport {
    async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError> {
        if query.len() > MAX_TCP_MESSAGE_SIZE {
            return Err(UpstreamError::QueryTooLarge {
                size: query.len(),
                max: MAX_TCP_MESSAGE_SIZE,
            });
        }

        let mut conn = self
            .pool
            .connect(self.server_addr, self.server_name.as_ref(), self.timeout)
            .await?;

        match self.exchange(conn.stream_mut(), query, answer).await {
            Ok(len) => {
                conn.release(true);
                Ok(len)
            }
            Err(e) => {
                conn.release(false);
                Err(e)
            }
        }
    }

    fn protocol(&self) -> UpstreamProtocol {
        if self.uses_tls() {
            UpstreamProtocol::Dot
        } else {
            UpstreamProtocol::Tcp
        }
    }
}

pub(crate) async fn send_with_length_prefix<S>(stream: &mut S, message: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let length = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} bytes does not fit a length prefix", message.len()),
        )
    })?;

    // One write so the prefix and message share a segment (and a TLS record).
    let mut framed = Vec::with_capacity(message.len() + 2);
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(message);

    stream.write_all(&framed).await?;
    stream.flush().await
}

/// Reads one length-prefixed message into `answer`.
///
/// The declared length is checked against `answer` before the body is read,
/// and `answer` is only written once the whole body has arrived.
pub(crate) async fn read_with_length_prefix<S>(
    stream: &mut S,
    answer: &mut [u8],
    server: &str,
) -> Result<usize, UpstreamError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| read_error(server, "response length", e))?;

    let response_len = u16::from_be_bytes(len_buf) as usize;

    if response_len > answer.len() {
        return Err(UpstreamError::BufferTooSmall {
            size: response_len,
            capacity: answer.len(),
        });
    }

    let mut body = vec![0u8; response_len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| read_error(server, "response body", e))?;

    answer[..response_len].copy_from_slice(&body);
    Ok(response_len)
}

pub(crate) fn read_error(server: &str, what: &str, e: io::Error) -> UpstreamError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        UpstreamError::MalformedResponse {
            server: server.to_string(),
            reason: format!("connection closed while reading {}", what),
        }
    } else {
        UpstreamError::Unreachable {
            server: server.to_string(),
            reason: format!("failed to read {}: {}", what, e),
        }
    }
}
