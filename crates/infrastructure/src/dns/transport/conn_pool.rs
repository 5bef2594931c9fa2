use super::tls;
use dashmap::DashMap;
use dnsfilter_domain::UpstreamError;
use rustls::pki_types::ServerName;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

const DEFAULT_MAX_IDLE_PER_HOST: usize = 4;

/// Identity of a pooled connection: remote address plus the TLS server name,
/// or `None` for plain TCP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    addr: SocketAddr,
    server_name: Option<ServerName<'static>>,
}

impl PoolKey {
    pub fn new(addr: SocketAddr, server_name: Option<&ServerName<'static>>) -> Self {
        Self {
            addr,
            server_name: server_name.cloned(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_tls(&self) -> bool {
        self.server_name.is_some()
    }
}

/// Byte stream handed out by the pool, plain or TLS-wrapped.
pub enum PooledStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl PooledStream {
    /// Non-blocking liveness check for an idle stream.
    ///
    /// A plain DNS stream must be silent while idle, so any readable byte
    /// means the stream is out of sync. A TLS stream is polled through the
    /// session: records the peer sent while idle (session tickets) are
    /// consumed, and a `close_notify`, EOF, error or stray plaintext marks
    /// it dead.
    fn is_alive(&mut self) -> bool {
        let mut scratch = [0u8; 1];
        let mut buf = ReadBuf::new(&mut scratch);
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());

        match self {
            PooledStream::Plain(s) => matches!(s.poll_peek(&mut cx, &mut buf), Poll::Pending),
            PooledStream::Tls(s) => matches!(
                Pin::new(s.as_mut()).poll_read(&mut cx, &mut buf),
                Poll::Pending
            ),
        }
    }
}

impl AsyncRead for PooledStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PooledStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            PooledStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Plain(s) => Pin::new(s).poll_flush(cx),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

struct IdleConnection {
    stream: PooledStream,
    idle_since: Instant,
}

/// Pool of reusable TCP and TLS connections to upstream resolvers.
///
/// A connection is removed from the idle set when it is handed out, so it is
/// never shared between two callers. Idle connections older than
/// `idle_timeout` are dropped instead of reused.
pub struct ConnectionPool {
    idle: DashMap<PoolKey, Vec<IdleConnection>>,
    connector: TlsConnector,
    idle_timeout: Duration,
    max_idle_per_host: usize,
    total_created: AtomicU64,
    total_reused: AtomicU64,
}

impl ConnectionPool {
    /// Pool verifying upstream certificates against the webpki roots.
    pub fn new(idle_timeout: Duration) -> Self {
        Self::with_tls_config(idle_timeout, tls::shared_client_config())
    }

    pub fn with_tls_config(idle_timeout: Duration, tls_config: Arc<rustls::ClientConfig>) -> Self {
        info!(
            idle_timeout_ms = idle_timeout.as_millis() as u64,
            "Initializing upstream connection pool"
        );

        Self {
            idle: DashMap::new(),
            connector: TlsConnector::from(tls_config),
            idle_timeout,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            total_created: AtomicU64::new(0),
            total_reused: AtomicU64::new(0),
        }
    }

    pub fn with_max_idle_per_host(mut self, max_idle_per_host: usize) -> Self {
        self.max_idle_per_host = max_idle_per_host;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Checks out a connection to `addr`, reusing an idle one when possible.
    ///
    /// `timeout` bounds the TCP connect and the TLS handshake separately.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        server_name: Option<&ServerName<'static>>,
        timeout: Duration,
    ) -> Result<PooledConnection<'_>, UpstreamError> {
        let key = PoolKey::new(addr, server_name);

        if let Some(stream) = self.take_idle(&key) {
            self.total_reused.fetch_add(1, Ordering::Relaxed);
            debug!(server = %addr, tls = key.is_tls(), "Reusing pooled connection");
            return Ok(PooledConnection {
                pool: self,
                key,
                stream,
                reused: true,
            });
        }

        let stream = self.open(&key, timeout).await?;
        self.total_created.fetch_add(1, Ordering::Relaxed);

        Ok(PooledConnection {
            pool: self,
            key,
            stream,
            reused: false,
        })
    }

    async fn open(&self, key: &PoolKey, timeout: Duration) -> Result<PooledStream, UpstreamError> {
        let server = key.addr.to_string();

        let tcp_stream = tokio::time::timeout(timeout, TcpStream::connect(key.addr))
            .await
            .map_err(|_| UpstreamError::Unreachable {
                server: server.clone(),
                reason: format!("timed out connecting after {}ms", timeout.as_millis()),
            })?
            .map_err(|e| UpstreamError::Unreachable {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        tcp_stream
            .set_nodelay(true)
            .map_err(|e| UpstreamError::Unreachable {
                server: server.clone(),
                reason: format!("failed to set TCP_NODELAY: {}", e),
            })?;

        let Some(server_name) = &key.server_name else {
            debug!(server = %key.addr, "TCP connection established");
            return Ok(PooledStream::Plain(tcp_stream));
        };

        let tls_stream = tokio::time::timeout(
            timeout,
            self.connector.connect(server_name.clone(), tcp_stream),
        )
        .await
        .map_err(|_| UpstreamError::Unreachable {
            server: server.clone(),
            reason: "timed out during TLS handshake".to_string(),
        })?
        .map_err(|e| UpstreamError::Unreachable {
            server: server.clone(),
            reason: format!("TLS handshake failed: {}", e),
        })?;

        debug!(server = %key.addr, server_name = ?server_name, "TLS connection established");
        Ok(PooledStream::Tls(Box::new(tls_stream)))
    }

    fn take_idle(&self, key: &PoolKey) -> Option<PooledStream> {
        let mut entry = self.idle.get_mut(key)?;

        // Most recently returned first; older entries are the likeliest to be stale.
        while let Some(mut idle) = entry.pop() {
            if idle.idle_since.elapsed() >= self.idle_timeout {
                debug!(server = %key.addr, "Dropping expired pooled connection");
                continue;
            }
            if !idle.stream.is_alive() {
                debug!(server = %key.addr, "Dropping pooled connection closed by peer");
                continue;
            }
            return Some(idle.stream);
        }

        None
    }

    fn give_back(&self, key: PoolKey, stream: PooledStream) {
        let addr = key.addr;
        let mut entry = self.idle.entry(key).or_default();

        if entry.len() < self.max_idle_per_host {
            entry.push(IdleConnection {
                stream,
                idle_since: Instant::now(),
            });
            debug!(server = %addr, pool_size = entry.len(), "Returned connection to pool");
        } else {
            debug!(server = %addr, "Pool full, dropping connection");
        }
    }

    /// Drops every idle connection past the idle timeout. Returns how many
    /// were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for mut entry in self.idle.iter_mut() {
            let before = entry.len();
            entry.retain(|idle| idle.idle_since.elapsed() < self.idle_timeout);
            purged += before - entry.len();
        }
        self.idle.retain(|_, conns| !conns.is_empty());

        if purged > 0 {
            debug!(purged, "Purged expired pooled connections");
        }
        purged
    }

    pub fn clear(&self) {
        let count: usize = self.idle.iter().map(|e| e.len()).sum();
        self.idle.clear();
        info!(count, "Cleared upstream connection pool");
    }

    pub fn stats(&self) -> PoolStats {
        let total_idle: usize = self.idle.iter().map(|e| e.len()).sum();

        PoolStats {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_idle,
            hosts: self.idle.len(),
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// `release(true)` returns it for reuse. `release(false)`, or dropping it,
/// closes it; a connection that saw an error is never reused.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    key: PoolKey,
    stream: PooledStream,
    reused: bool,
}

impl PooledConnection<'_> {
    pub fn stream_mut(&mut self) -> &mut PooledStream {
        &mut self.stream
    }

    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn release(self, success: bool) {
        if success {
            self.pool.give_back(self.key, self.stream);
        } else {
            debug!(server = %self.key.addr, "Discarding failed connection");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened (TCP connect, plus handshake for TLS).
    pub total_created: u64,
    /// Checkouts served by an idle connection.
    pub total_reused: u64,
    pub total_idle: usize,
    pub hosts: usize,
}

impl PoolStats {
    pub fn reuse_rate(&self) -> f64 {
        let total = self.total_created + self.total_reused;
        if total == 0 {
            0.0
        } else {
            self.total_reused as f64 / total as f64
        }
    }
}
