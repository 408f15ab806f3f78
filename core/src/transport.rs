//! Contract of the underlying asynchronous HTTP transport.
//!
//! # Design
//! The transport is an opaque capability: it takes an immutable
//! `TransportRequest`, returns a future of a `TransportResponse`, and may
//! expose an executor for blocking work. Connection pooling, HTTP/2 and TLS
//! all live behind this trait. A request is assembled with a
//! `TransportRequestBuilder` and frozen by `build()`; the transport takes it
//! apart with `into_parts()` when it sends.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::error::TransportError;
use crate::http::Headers;

/// Future returned by `Transport::send_async`.
pub type ResponseFuture = BoxFuture<'static, Result<TransportResponse, TransportError>>;

pub trait Transport: Send + Sync + 'static {
    /// Issue the request. The future must be driven on a tokio runtime.
    fn send_async(&self, request: TransportRequest) -> ResponseFuture;

    /// Executor for blocking work (entity writers). `None` means the
    /// connector uses its own runtime.
    fn executor(&self) -> Option<Handle> {
        None
    }

    fn name(&self) -> &str;
}

/// Where the request body comes from.
pub enum BodySource {
    Empty,
    /// Fully known body, sent with a fixed length.
    Fixed(Bytes),
    /// Body pulled from a reader while the request is in flight.
    Reader(Box<dyn Read + Send>),
}

impl BodySource {
    pub fn kind(&self) -> &'static str {
        match self {
            BodySource::Empty => "empty",
            BodySource::Fixed(_) => "fixed",
            BodySource::Reader(_) => "reader",
        }
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Empty => write!(f, "Empty"),
            BodySource::Fixed(b) => write!(f, "Fixed({} bytes)", b.len()),
            BodySource::Reader(_) => write!(f, "Reader"),
        }
    }
}

/// Immutable transport-side request.
#[derive(Debug)]
pub struct TransportRequest {
    method: String,
    uri: String,
    headers: Headers,
    timeout: Option<Duration>,
    body: BodySource,
}

/// Decomposed request, consumed by a transport when sending.
#[derive(Debug)]
pub struct RequestParts {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
    pub timeout: Option<Duration>,
    pub body: BodySource,
}

impl TransportRequest {
    pub fn builder(method: &str, uri: &str) -> TransportRequestBuilder {
        TransportRequestBuilder {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Headers::new(),
            timeout: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn body(&self) -> &BodySource {
        &self.body
    }

    pub fn into_parts(self) -> RequestParts {
        RequestParts {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            timeout: self.timeout,
            body: self.body,
        }
    }
}

/// Per-request builder. Consumed by `build`, so each builder yields exactly
/// one request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequestBuilder {
    method: String,
    uri: String,
    headers: Headers,
    timeout: Option<Duration>,
}

impl TransportRequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn build(self, body: BodySource) -> TransportRequest {
        TransportRequest {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            timeout: self.timeout,
            body,
        }
    }
}

/// Native response body. Single-read; `close` releases transport resources
/// and must be called (or the body dropped) exactly once.
pub trait ResponseBody: Read + Send {
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseBody for io::Empty {}

impl ResponseBody for io::Cursor<Vec<u8>> {}

impl ResponseBody for io::Cursor<Bytes> {}

/// Response produced by a transport.
pub struct TransportResponse {
    status: u16,
    headers: Headers,
    body: Option<Box<dyn ResponseBody>>,
}

impl TransportResponse {
    pub fn new(status: u16, headers: Headers, body: Box<dyn ResponseBody>) -> Self {
        Self {
            status,
            headers,
            body: Some(body),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Hand out the body. Returns `None` once it has been taken.
    pub fn take_body(&mut self) -> Option<Box<dyn ResponseBody>> {
        self.body.take()
    }

    pub fn into_parts(self) -> (u16, Headers, Option<Box<dyn ResponseBody>>) {
        (self.status, self.headers, self.body)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "..."))
            .finish()
    }
}
