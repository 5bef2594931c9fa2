//! Minimal HTTP/1.1 message heads, as needed for DNS-over-HTTPS.
//!
//! Only what a single POST with a `Content-Length` body needs: request heads
//! are serialized from structured fields, response heads are parsed with
//! `httparse`. Chunked bodies are detected but not decoded.

use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound on a response head, status line included.
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("invalid response head: {0}")]
    Invalid(String),

    #[error("connection closed before the response head was complete")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Request line plus headers. `Content-Length` is never stored; it is
/// computed by [`RequestHead::encode`] for each body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    target: String,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name != CONTENT_LENGTH {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn encode(&self, content_length: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(format!("content-length: {}\r\n\r\n", content_length).as_bytes());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub content_length: Option<usize>,
    pub chunked: bool,
    /// The server announced it will close the connection after this response.
    pub connection_close: bool,
}

impl ResponseHead {
    /// Parses a complete head (terminated by an empty line).
    pub fn parse(raw: &[u8]) -> Result<Self, HttpError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        match response.parse(raw) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(HttpError::Invalid("incomplete head".to_string()))
            }
            Err(e) => return Err(HttpError::Invalid(e.to_string())),
        }

        let status = response
            .code
            .ok_or_else(|| HttpError::Invalid("missing status code".to_string()))?;

        let mut head = ResponseHead {
            status,
            reason: response.reason.unwrap_or_default().to_string(),
            content_length: None,
            chunked: false,
            connection_close: false,
        };

        for header in response.headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| HttpError::Invalid(format!("non-UTF-8 {} header", header.name)))?
                .trim();

            if header.name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
                let length = value.parse::<usize>().map_err(|_| {
                    HttpError::Invalid(format!("invalid Content-Length '{}'", value))
                })?;
                head.content_length = Some(length);
            } else if header.name.eq_ignore_ascii_case(TRANSFER_ENCODING.as_str()) {
                head.chunked |= value.to_ascii_lowercase().contains("chunked");
            } else if header.name.eq_ignore_ascii_case(CONNECTION.as_str()) {
                head.connection_close |= value.eq_ignore_ascii_case("close");
            }
        }

        Ok(head)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Reads a response head line by line, leaving the body unread in `reader`.
pub async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(512);

    loop {
        let remaining = (MAX_HEAD_SIZE + 1).saturating_sub(raw.len()) as u64;
        let read = (&mut *reader).take(remaining).read_until(b'\n', &mut raw).await?;

        if read == 0 {
            return Err(HttpError::Closed);
        }
        if raw.len() > MAX_HEAD_SIZE {
            return Err(HttpError::HeadTooLarge(MAX_HEAD_SIZE));
        }
        if raw.ends_with(b"\r\n\r\n") || raw.ends_with(b"\n\n") {
            return ResponseHead::parse(&raw);
        }
    }
}
