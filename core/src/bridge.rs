//! Joins the entity writer with the transport send.
//!
//! # Design
//! Empty and fixed bodies go straight to `Transport::send_async`. A buffered
//! entity is written into a `BoundedBuffer` on the calling thread and then
//! sent as a fixed body. A streamed entity is written into a `BodyPipe` on a
//! blocking worker while the transport pulls from the other end.
//!
//! The streamed case races two futures:
//! - writer fails first: the pipe is aborted, the send future is dropped and
//!   `WriteFailed` is reported;
//! - send finishes first (response or error): that result is reported and
//!   the writer is released by aborting the pipe;
//! - writer succeeds first: the send result is awaited and reported;
//! - writer fails because the transport dropped the body: the send result
//!   is awaited and reported.
//!
//! A failed writer never ends the stream on its own (see `pipe`), so the
//! transport cannot observe the failure before the bridge has reported it.

use std::io::{self, Write};
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture, Either};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ProcessingError;
use crate::http::EntityWriter;
use crate::pipe::{BodyPipe, PipeEnds, PipeGuard, PipeWriter};
use crate::translate::BodyPlan;
use crate::transport::{
    BodySource, ResponseFuture, Transport, TransportRequestBuilder, TransportResponse,
};

/// Future of one request attempt's outcome.
pub type BridgeFuture = BoxFuture<'static, Result<TransportResponse, ProcessingError>>;

/// Build the request for `plan` and start sending it.
///
/// Buffered entities are written before this returns; streamed entities
/// start writing on `executor` and race the send.
pub fn send<T: Transport + ?Sized>(
    transport: &T,
    builder: TransportRequestBuilder,
    plan: BodyPlan,
    executor: &Handle,
) -> Result<BridgeFuture, ProcessingError> {
    let body = match plan {
        BodyPlan::Empty => BodySource::Empty,
        BodyPlan::Fixed(bytes) => BodySource::Fixed(bytes),
        BodyPlan::Buffered { writer, capacity } => {
            BodySource::Fixed(buffer_entity(writer.as_ref(), capacity)?)
        }
        BodyPlan::Streaming(writer) => return stream(transport, builder, writer, executor),
    };
    let request = builder.build(body);
    Ok(transport
        .send_async(request)
        .map(|result| result.map_err(ProcessingError::from))
        .boxed())
}

/// Write an entity into memory, failing once it grows past `capacity` bytes.
pub fn buffer_entity(
    writer: &dyn EntityWriter,
    capacity: usize,
) -> Result<Bytes, ProcessingError> {
    let mut sink = BoundedBuffer::new(capacity);
    writer
        .write_to(&mut sink)
        .map_err(ProcessingError::write_failed)?;
    Ok(sink.into_bytes())
}

/// Stream an entity through a freshly connected pipe.
pub fn stream<T: Transport + ?Sized>(
    transport: &T,
    builder: TransportRequestBuilder,
    writer: Arc<dyn EntityWriter>,
    executor: &Handle,
) -> Result<BridgeFuture, ProcessingError> {
    let pipe = BodyPipe::new();
    let PipeEnds {
        writer: sink,
        reader,
        guard,
    } = pipe.connect()?;

    let request = builder.build(BodySource::Reader(Box::new(reader)));
    let send = transport.send_async(request);
    let write = executor.spawn_blocking(move || write_entity(writer.as_ref(), sink));

    Ok(join(write, send, guard).boxed())
}

fn write_entity(writer: &dyn EntityWriter, mut sink: PipeWriter) -> io::Result<()> {
    writer.write_to(&mut sink)?;
    sink.close()
}

async fn join(
    write: JoinHandle<io::Result<()>>,
    send: ResponseFuture,
    guard: PipeGuard,
) -> Result<TransportResponse, ProcessingError> {
    let write = pin!(async move {
        match write.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ProcessingError::write_failed(err)),
            Err(err) => Err(ProcessingError::Worker(err.to_string())),
        }
    });

    let outcome = match future::select(write, send).await {
        Either::Left((Ok(()), send)) => send.await.map_err(ProcessingError::from),
        Either::Left((Err(err), send)) if guard.consumer_closed() => {
            // The transport dropped the body first; its outcome is the cause.
            debug!(error = %err, "entity writer stopped after the transport let go");
            send.await.map_err(ProcessingError::from)
        }
        Either::Left((Err(err), send)) => {
            debug!(error = %err, "entity writer failed, cancelling send");
            guard.abort("entity writer failed");
            drop(send);
            Err(err)
        }
        Either::Right((result, _)) => {
            if let Err(err) = &result {
                debug!(error = %err, "transport failed before the entity was written");
            }
            result.map_err(ProcessingError::from)
        }
    };
    drop(guard);
    outcome
}

/// Growable in-memory sink with an upper bound.
#[derive(Debug)]
pub struct BoundedBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl BoundedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

impl Write for BoundedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("entity exceeds the buffer capacity of {} bytes", self.capacity),
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
