//! DNS-over-HTTPS transport (RFC 8484), HTTP/1.1 over a pooled TLS stream.
//!
//! ```text
//! POST /dns-query HTTP/1.1
//! host: dns.example
//! accept: application/dns-message
//! content-type: application/dns-message
//! content-length: <query length>
//!
//! <raw DNS message bytes>
//! ```
//!
//! The response must be `200` with a `Content-Length` body; chunked replies
//! are rejected.

use super::conn_pool::{ConnectionPool, PooledStream};
use super::tcp::{read_error, MAX_TCP_MESSAGE_SIZE};
use super::{tls, DnsTransport};
use crate::http::{read_response_head, HttpError, RequestHead};
use async_trait::async_trait;
use dnsfilter_domain::{ConfigError, UpstreamConfig, UpstreamError, UpstreamProtocol};
use http::header::{HeaderValue, ACCEPT, CONNECTION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Uri};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

pub struct HttpsTransport {
    server_addr: SocketAddr,
    url: String,
    server_name: ServerName<'static>,
    request: RequestHead,
    timeout: Duration,
    pool: Arc<ConnectionPool>,
}

impl HttpsTransport {
    /// Builds the request head once from the configured endpoint.
    ///
    /// The endpoint is either an absolute `https://` URL, whose host becomes
    /// the TLS server name, or a bare path served by the configured host.
    /// Either way the connection goes to `config.addr()`.
    pub fn new(config: &UpstreamConfig, pool: Arc<ConnectionPool>) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint().ok_or(ConfigError::MissingEndpoint)?;
        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let (authority, http_host, target) = if endpoint.starts_with('/') {
            let authority = bracket_ipv6(config.host());
            (authority.clone(), authority, endpoint.to_string())
        } else {
            let uri: Uri = endpoint.parse().map_err(|e: http::uri::InvalidUri| {
                invalid(&e.to_string())
            })?;

            match uri.scheme_str() {
                Some(scheme) if scheme.eq_ignore_ascii_case("https") => {}
                Some(_) => return Err(invalid("scheme must be https")),
                None => return Err(invalid("expected an https URL or an absolute path")),
            }

            let authority = uri
                .authority()
                .ok_or_else(|| invalid("missing host"))?
                .as_str()
                .to_string();
            let http_host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
            let target = uri
                .path_and_query()
                .map(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .unwrap_or("/")
                .to_string();

            (authority, http_host, target)
        };

        let server_name = tls::server_name(&http_host)?;
        let url = format!("https://{}{}", authority, target);

        let host_value = HeaderValue::from_str(&authority).map_err(|_| invalid("invalid host"))?;
        let user_agent = HeaderValue::from_str(&user_agent())
            .map_err(|_| ConfigError::Validation("invalid User-Agent".to_string()))?;

        let request = RequestHead::new(Method::POST, target)
            .header(HOST, host_value)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, HeaderValue::from_static(DNS_MESSAGE_CONTENT_TYPE))
            .header(CONTENT_TYPE, HeaderValue::from_static(DNS_MESSAGE_CONTENT_TYPE))
            .header(CONNECTION, HeaderValue::from_static("keep-alive"));

        Ok(Self {
            server_addr: config.addr(),
            url,
            server_name,
            request,
            timeout: config.timeout(),
            pool,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the answer length and whether the connection may be reused.
    async fn exchange(
        &self,
        stream: &mut PooledStream,
        query: &[u8],
        answer: &mut [u8],
    ) -> Result<(usize, bool), UpstreamError> {
        let server = self.server_addr.to_string();

        let mut request = self.request.encode(query.len());
        request.extend_from_slice(query);

        tokio::time::timeout(self.timeout, async {
            stream.write_all(&request).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| UpstreamError::Unreachable {
            server: server.clone(),
            reason: "timed out sending request".to_string(),
        })?
        .map_err(|e| UpstreamError::Unreachable {
            server: server.clone(),
            reason: e.to_string(),
        })?;

        debug!(url = %self.url, message_len = query.len(), "DoH query sent");

        let mut reader = BufReader::new(stream);

        let head = tokio::time::timeout(self.timeout, read_response_head(&mut reader))
            .await
            .map_err(|_| UpstreamError::NoResponse {
                server: server.clone(),
            })?
            .map_err(|e| match e {
                HttpError::Io(e) => read_error(&server, "response head", e),
                other => UpstreamError::MalformedResponse {
                    server: server.clone(),
                    reason: other.to_string(),
                },
            })?;

        if !head.is_ok() {
            return Err(UpstreamError::UpstreamHttp {
                url: self.url.clone(),
                status: head.status,
                reason: head.reason,
            });
        }

        if head.chunked {
            return Err(UpstreamError::MalformedResponse {
                server,
                reason: "chunked transfer encoding is not supported".to_string(),
            });
        }

        let body_len = head
            .content_length
            .ok_or_else(|| UpstreamError::MalformedResponse {
                server: server.clone(),
                reason: "response without Content-Length".to_string(),
            })?;

        if body_len > answer.len() {
            return Err(UpstreamError::BufferTooSmall {
                size: body_len,
                capacity: answer.len(),
            });
        }

        let mut body = vec![0u8; body_len];
        tokio::time::timeout(self.timeout, reader.read_exact(&mut body))
            .await
            .map_err(|_| UpstreamError::NoResponse {
                server: server.clone(),
            })?
            .map_err(|e| read_error(&server, "response body", e))?;

        // Bytes past the body would desync the next exchange on this stream.
        let reusable = reader.buffer().is_empty() && !head.connection_close;

        answer[..body_len].copy_from_slice(&body);

        debug!(url = %self.url, response_len = body_len, reusable, "DoH response received");

        Ok((body_len, reusable))
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn resolve(&self, query: &[u8], answer: &mut [u8]) -> Result<usize, UpstreamError> {
        if query.len() > MAX_TCP_MESSAGE_SIZE {
            return Err(UpstreamError::QueryTooLarge {
                size: query.len(),
                max: MAX_TCP_MESSAGE_SIZE,
            });
        }

        let mut conn = self
            .pool
            .connect(self.server_addr, Some(&self.server_name), self.timeout)
            .await?;

        match self.exchange(conn.stream_mut(), query, answer).await {
            Ok((len, reusable)) => {
                conn.release(reusable);
                Ok(len)
            }
            Err(e) => {
                conn.release(false);
                Err(e)
            }
        }
    }

    fn protocol(&self) -> UpstreamProtocol {
        UpstreamProtocol::Doh
    }
}

fn user_agent() -> String {
    format!(
        "Mozilla/5.0 ({}; {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}
