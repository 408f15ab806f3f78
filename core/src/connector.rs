//! Dispatch of framework requests through a `Transport`.
//!
//! # Design
//! `Connector` owns a multi-thread tokio runtime. Both invocation styles
//! share the same steps: translate the request, start the bridge, bound the
//! resulting future by the read timeout, translate the response. They
//! differ only in how the caller joins the outcome:
//! - `send` blocks the calling thread (interruptibly) on the spawned task;
//! - `send_async` returns a `ResponseHandle` at once and reports the
//!   outcome to a callback, exactly once, before the handle resolves.
//!
//! The read timeout is enforced twice: natively by the transport on the
//! request, and here on the join with a small margin. Whichever fires first
//! is reported. When the join bound fires, the attempt's future is dropped,
//! which aborts a piped body and releases the writer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace};

use crate::bridge::{self, BridgeFuture};
use crate::config::{ConnectorConfig, Properties};
use crate::error::ProcessingError;
use crate::http::{InboundResponse, OutboundRequest};
use crate::interrupt;
use crate::response;
use crate::translate::{translate, Translation};
use crate::transport::{Transport, TransportResponse};
use crate::ureq_transport::UreqTransport;

/// Margin added to the read timeout when bounding the join.
pub const READ_TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

/// Lifecycle of one dispatched request, as reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Building,
    Sending,
    Awaiting,
    Complete,
    Failed,
}

pub struct Connector<T: Transport = UreqTransport> {
    transport: Arc<T>,
    config: ConnectorConfig,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Connector<UreqTransport> {
    /// Build a connector over a `ureq` agent configured from client
    /// properties. Proxy and connect timeout are installed here, once.
    pub fn from_properties(props: &Properties) -> Result<Self, ProcessingError> {
        let config = ConnectorConfig::from_properties(props)?;
        let transport = UreqTransport::new(&config)?;
        Self::with_config(transport, config)
    }
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T) -> Result<Self, ProcessingError> {
        Self::with_config(transport, ConnectorConfig::default())
    }

    pub fn with_config(transport: T, config: ConnectorConfig) -> Result<Self, ProcessingError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("connector-worker")
            .enable_all()
            .build()
            .map_err(|e| ProcessingError::Worker(format!("cannot start connector runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            transport: Arc::new(transport),
            config,
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        self.transport.name()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Send and block until the response is available, the read timeout
    /// elapses, or the calling thread is interrupted.
    pub fn send(&self, request: &OutboundRequest) -> Result<InboundResponse, ProcessingError> {
        let (attempt, read_timeout) = self.start(request)?;
        let mut task = self.handle.spawn(bounded(attempt, read_timeout));

        trace!(phase = ?Phase::Awaiting, ?read_timeout, "waiting for response");
        let outcome = match interrupt::block_on(&mut task) {
            Ok(joined) => joined.unwrap_or_else(|e| Err(join_error(e))),
            Err(interrupt::Interrupted) => {
                task.abort();
                Err(ProcessingError::Interrupted)
            }
        };
        finish(request, outcome)
    }

    /// Send without blocking. `callback` receives the outcome exactly once,
    /// before the returned handle resolves to the same outcome.
    pub fn send_async<F>(&self, request: &OutboundRequest, callback: F) -> ResponseHandle
    where
        F: FnOnce(Result<&InboundResponse, &ProcessingError>) + Send + 'static,
    {
        let started = self.start(request);
        let method = request.method.clone();
        let uri = request.uri.clone();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let report = CallbackGuard::new(callback);

        let task = self.handle.spawn(async move {
            let outcome = match started {
                Ok((attempt, read_timeout)) => {
                    tokio::select! {
                        biased;
                        () = cancelled(cancel_rx) => Err(ProcessingError::Cancelled),
                        outcome = bounded(attempt, read_timeout) => outcome,
                    }
                }
                Err(err) => Err(err),
            };
            let outcome = finish_parts(&method, &uri, outcome);
            report.fire(outcome.as_ref());
            outcome
        });

        ResponseHandle {
            task,
            cancel: Some(cancel_tx),
        }
    }

    /// BUILDING and SENDING: translate, then start the bridge.
    fn start(
        &self,
        request: &OutboundRequest,
    ) -> Result<(BridgeFuture, Option<Duration>), ProcessingError> {
        trace!(phase = ?Phase::Building, method = %request.method, uri = %request.uri);
        let Translation {
            builder,
            read_timeout,
            body,
        } = translate(request, &self.config)?;

        debug!(
            phase = ?Phase::Sending,
            method = %request.method,
            uri = %request.uri,
            body = body.kind(),
            "dispatching request"
        );
        let executor = self
            .transport
            .executor()
            .unwrap_or_else(|| self.handle.clone());
        let attempt = bridge::send(self.transport.as_ref(), builder, body, &executor)?;
        Ok((attempt, read_timeout))
    }
}

impl<T: Transport> Drop for Connector<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Holds the `send_async` callback until it has been called. If the task is
/// torn down first (runtime shutdown, abort) the callback sees `Cancelled`.
struct CallbackGuard<F>
where
    F: FnOnce(Result<&InboundResponse, &ProcessingError>),
{
    callback: Option<F>,
}

impl<F> CallbackGuard<F>
where
    F: FnOnce(Result<&InboundResponse, &ProcessingError>),
{
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn fire(mut self, outcome: Result<&InboundResponse, &ProcessingError>) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl<F> Drop for CallbackGuard<F>
where
    F: FnOnce(Result<&InboundResponse, &ProcessingError>),
{
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            debug!(phase = ?Phase::Failed, "request dropped before completion");
            callback(Err(&ProcessingError::Cancelled));
        }
    }
}

async fn bounded(
    attempt: BridgeFuture,
    read_timeout: Option<Duration>,
) -> Result<TransportResponse, ProcessingError> {
    let Some(limit) = read_timeout else {
        return attempt.await;
    };
    match tokio::time::timeout(limit + READ_TIMEOUT_MARGIN, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ProcessingError::Timeout(limit)),
    }
}

/// Resolves when cancellation is requested; never, if the sender is dropped.
async fn cancelled(rx: oneshot::Receiver<()>) {
    if rx.await.is_err() {
        future::pending::<()>().await;
    }
}

fn finish(
    request: &OutboundRequest,
    outcome: Result<TransportResponse, ProcessingError>,
) -> Result<InboundResponse, ProcessingError> {
    finish_parts(&request.method, &request.uri, outcome)
}

fn finish_parts(
    method: &str,
    uri: &str,
    outcome: Result<TransportResponse, ProcessingError>,
) -> Result<InboundResponse, ProcessingError> {
    match outcome {
        Ok(native) => {
            let response = response::to_inbound(native);
            debug!(phase = ?Phase::Complete, method, uri, status = response.status);
            Ok(response)
        }
        Err(err) => {
            debug!(phase = ?Phase::Failed, method, uri, error = %err);
            Err(err)
        }
    }
}

fn join_error(err: JoinError) -> ProcessingError {
    if err.is_cancelled() {
        ProcessingError::Cancelled
    } else {
        ProcessingError::Worker(err.to_string())
    }
}

/// Handle on a request started with `Connector::send_async`.
///
/// Await it, or `wait()` for it from a blocking thread. Dropping the handle
/// does not cancel the request.
#[derive(Debug)]
pub struct ResponseHandle {
    task: JoinHandle<Result<InboundResponse, ProcessingError>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl ResponseHandle {
    /// Ask the request to stop. Returns `false` if it already finished or
    /// was already cancelled. Bytes already handed to the transport may
    /// still go out.
    pub fn cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Block until the outcome is available or the thread is interrupted.
    pub fn wait(self) -> Result<InboundResponse, ProcessingError> {
        interrupt::block_on(self).unwrap_or(Err(ProcessingError::Interrupted))
    }
}

impl Future for ResponseHandle {
    type Output = Result<InboundResponse, ProcessingError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(join_error(e))))
    }
}
