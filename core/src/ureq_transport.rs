//! Default `Transport` backed by a `ureq` agent.
//!
//! # Design
//! The agent is configured once: connect timeout and proxy come from the
//! `ConnectorConfig`, and HTTP error statuses are returned as responses so
//! the framework interprets them. Each request may carry its own timeout,
//! which bounds the wait for the response head only: once the status line
//! and headers are in, reading the body is not limited by it. `send` is
//! synchronous; `send_async` runs it on the tokio blocking pool, which is
//! also where a piped request body gets pulled.
//!
//! Dropping the future returned by `send_async` stops waiting but does not
//! stop a call already running on the blocking pool; for piped bodies the
//! bridge aborts the pipe, which makes that call fail promptly.

use std::io::{self, Read};
use std::time::Duration;

use futures::FutureExt;
use tracing::trace;
use ureq::http;
use ureq::{Agent, AsSendBody, RequestExt, SendBody};

use crate::config::{ConnectorConfig, ProxyAddress};
use crate::error::{ConfigError, TransportError};
use crate::http::Headers;
use crate::transport::{
    BodySource, RequestParts, ResponseBody, ResponseFuture, Transport, TransportRequest,
    TransportResponse,
};

#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// Build an agent from client-scoped settings.
    pub fn new(config: &ConnectorConfig) -> Result<Self, ConfigError> {
        let proxy = config.proxy.as_ref().map(build_proxy).transpose()?;
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(config.connect_timeout)
            .proxy(proxy)
            .build()
            .new_agent();
        Ok(Self { agent })
    }

    /// Wrap an agent configured elsewhere. It should not treat HTTP error
    /// statuses as errors.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Perform the exchange on the calling thread.
    pub fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let RequestParts {
            method,
            uri,
            headers,
            timeout,
            body,
        } = request.into_parts();
        trace!(%method, %uri, body = body.kind(), "ureq send");

        let mut builder = http::Request::builder()
            .method(method.as_str())
            .uri(uri.as_str());
        for (name, value) in headers.pairs() {
            builder = builder.header(name, value);
        }

        let response = match body {
            BodySource::Empty => self.run(builder.body(()), timeout),
            BodySource::Fixed(bytes) => self.run(builder.body(&bytes[..]), timeout),
            BodySource::Reader(mut reader) => {
                self.run(builder.body(SendBody::from_reader(&mut reader)), timeout)
            }
        }?;

        let (parts, body) = response.into_parts();
        let mut headers = Headers::new();
        for (name, value) in parts.headers.iter() {
            headers.add(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        Ok(TransportResponse::new(
            parts.status.as_u16(),
            headers,
            Box::new(UreqBody(body.into_reader())),
        ))
    }

    fn run<B: AsSendBody>(
        &self,
        request: Result<http::Request<B>, http::Error>,
        timeout: Option<Duration>,
    ) -> Result<http::Response<ureq::Body>, TransportError> {
        let request = request.map_err(|e| TransportError::Request(e.to_string()))?;
        request
            .with_agent(&self.agent)
            .configure()
            .timeout_recv_response(timeout)
            .build()
            .run()
            .map_err(map_error)
    }
}

impl Transport for UreqTransport {
    fn send_async(&self, request: TransportRequest) -> ResponseFuture {
        let transport = self.clone();
        async move {
            match tokio::task::spawn_blocking(move || transport.send(request)).await {
                Ok(result) => result,
                Err(err) => Err(TransportError::Other(format!("transport worker failed: {err}"))),
            }
        }
        .boxed()
    }

    fn name(&self) -> &str {
        "ureq"
    }
}

fn build_proxy(addr: &ProxyAddress) -> Result<ureq::Proxy, ConfigError> {
    let uri = if addr.host.contains(':') {
        format!("http://[{}]:{}", addr.host, addr.port)
    } else {
        format!("http://{}:{}", addr.host, addr.port)
    };
    ureq::Proxy::new(&uri).map_err(|e| ConfigError::InvalidProxy {
        uri,
        reason: e.to_string(),
    })
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(e) => TransportError::Io(e),
        ureq::Error::Timeout(kind) => TransportError::Timeout(format!("{kind:?}")),
        other => TransportError::Other(other.to_string()),
    }
}

/// Response body straight off the connection. Closing drops the reader.
struct UreqBody(ureq::BodyReader<'static>);

impl Read for UreqBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl ResponseBody for UreqBody {}
