#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

/// What a mock upstream sends back for each query.
#[derive(Debug, Clone)]
pub enum Reply {
    Echo,
    Fixed(Vec<u8>),
    /// Read the query, never answer.
    Silent,
    /// Read the query, then close the connection.
    Close,
    /// Answer one query with an echo, then shut the stream down cleanly
    /// (`close_notify` first when TLS is used).
    EchoThenShutdown,
}

pub struct MockUdpServer {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockUdpServer {
    pub async fn start(reply: Reply) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = queries.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { continue };
                        counter.fetch_add(1, Ordering::SeqCst);

                        match &reply {
                            Reply::Echo | Reply::EchoThenShutdown => {
                                let _ = socket.send_to(&buf[..len], peer).await;
                            }
                            Reply::Fixed(bytes) => {
                                let _ = socket.send_to(bytes, peer).await;
                            }
                            Reply::Silent | Reply::Close => {}
                        }
                    }
                }
            }
        });

        Self {
            addr,
            queries,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockUdpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Length-prefixed DNS over TCP, optionally wrapped in TLS.
pub struct MockStreamServer {
    addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockStreamServer {
    pub async fn start_tcp(reply: Reply) -> Self {
        Self::start(reply, None).await
    }

    pub async fn start_tls(reply: Reply, acceptor: TlsAcceptor) -> Self {
        Self::start(reply, Some(acceptor)).await
    }

    async fn start(reply: Reply, acceptor: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let queries = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let accept_counter = accepts.clone();
        let query_counter = queries.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        accept_counter.fetch_add(1, Ordering::SeqCst);

                        let reply = reply.clone();
                        let queries = query_counter.clone();
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            match acceptor {
                                Some(acceptor) => {
                                    if let Ok(tls) = acceptor.accept(stream).await {
                                        serve_stream(tls, reply, queries).await;
                                    }
                                }
                                None => serve_stream(stream, reply, queries).await,
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            accepts,
            queries,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockStreamServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_stream<S>(mut stream: S, reply: Reply, queries: Arc<AtomicUsize>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        if stream.read_exact(&mut query).await.is_err() {
            return;
        }
        queries.fetch_add(1, Ordering::SeqCst);

        let response = match &reply {
            Reply::Echo | Reply::EchoThenShutdown => query,
            Reply::Fixed(bytes) => bytes.clone(),
            Reply::Silent => continue,
            Reply::Close => return,
        };

        let mut framed = (response.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&response);
        if stream.write_all(&framed).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        if matches!(reply, Reply::EchoThenShutdown) {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

/// Response a [`MockDohServer`] sends for every request.
#[derive(Debug, Clone)]
pub struct DohReply {
    pub status: u16,
    pub reason: &'static str,
    /// `None` echoes the request body.
    pub body: Option<Vec<u8>>,
    pub connection_close: bool,
    pub chunked: bool,
}

impl DohReply {
    pub fn echo() -> Self {
        Self {
            status: 200,
            reason: "OK",
            body: None,
            connection_close: false,
            chunked: false,
        }
    }

    pub fn fixed(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            ..Self::echo()
        }
    }

    pub fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            body: Some(Vec::new()),
            ..Self::echo()
        }
    }

    pub fn closing(mut self) -> Self {
        self.connection_close = true;
        self
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }
}

/// HTTP/1.1 DoH endpoint over TLS that records every request head.
pub struct MockDohServer {
    addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockDohServer {
    pub async fn start(reply: DohReply, acceptor: TlsAcceptor) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let heads = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let accept_counter = accepts.clone();
        let recorded = heads.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        accept_counter.fetch_add(1, Ordering::SeqCst);

                        let reply = reply.clone();
                        let recorded = recorded.clone();
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            if let Ok(tls) = acceptor.accept(stream).await {
                                serve_doh(tls, reply, recorded).await;
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            accepts,
            heads,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn request_heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

impl Drop for MockDohServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_doh<S>(stream: S, reply: DohReply, heads: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    loop {
        let mut raw = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) | Err(_) => return,
                Ok(_) if raw.ends_with(b"\r\n\r\n") => break,
                Ok(_) => {}
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut request = httparse::Request::new(&mut headers);
        if !matches!(request.parse(&raw), Ok(httparse::Status::Complete(_))) {
            return;
        }
        let content_length = request
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-length"))
            .and_then(|h| std::str::from_utf8(h.value).ok()?.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        heads
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&raw).into_owned());

        let response_body = reply.body.clone().unwrap_or(body);

        let mut response = format!("HTTP/1.1 {} {}\r\n", reply.status, reply.reason);
        response.push_str("Content-Type: application/dns-message\r\n");
        if reply.chunked {
            response.push_str("Transfer-Encoding: chunked\r\n");
        } else {
            response.push_str(&format!("Content-Length: {}\r\n", response_body.len()));
        }
        if reply.connection_close {
            response.push_str("Connection: close\r\n");
        }
        response.push_str("\r\n");

        let mut bytes = response.into_bytes();
        if reply.chunked {
            bytes.extend_from_slice(format!("{:x}\r\n", response_body.len()).as_bytes());
            bytes.extend_from_slice(&response_body);
            bytes.extend_from_slice(b"\r\n0\r\n\r\n");
        } else {
            bytes.extend_from_slice(&response_body);
        }

        let stream = reader.get_mut();
        if stream.write_all(&bytes).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        if reply.connection_close {
            let _ = stream.shutdown().await;
            return;
        }
    }
}
