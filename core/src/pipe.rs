//! Bounded in-memory byte pipe between an entity writer and a transport.
//!
//! # Design
//! One `BodyPipe` serves one request attempt. `connect()` hands out the
//! producer end, the consumer end and a `PipeGuard`, and refuses to do so a
//! second time. The producer blocks while the ring buffer is full, the
//! consumer blocks while it is empty.
//!
//! A producer that stops without calling `PipeWriter::close` does not end
//! the stream: the consumer keeps waiting until the guard aborts the pipe.
//! This lets the owner of the guard decide which failure is reported when
//! the writer fails, before the transport sees anything. Dropping the guard
//! aborts the pipe, so a consumer is never left blocked once the attempt is
//! over.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::ProcessingError;

pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Default)]
struct State {
    buf: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
    aborted: Option<String>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl Shared {
    fn abort(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.aborted.is_none() {
            state.aborted = Some(reason.to_string());
        }
        drop(state);
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// An unconnected pipe.
#[derive(Debug)]
pub struct BodyPipe {
    shared: Arc<Shared>,
    connected: AtomicBool,
}

/// Both ends of a connected pipe plus its abort guard.
#[derive(Debug)]
pub struct PipeEnds {
    pub writer: PipeWriter,
    pub reader: PipeReader,
    pub guard: PipeGuard,
}

impl BodyPipe {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                readable: Condvar::new(),
                writable: Condvar::new(),
                capacity: capacity.max(1),
            }),
            connected: AtomicBool::new(false),
        }
    }

    /// Connect the producer to the consumer. Fails on every call after the first.
    pub fn connect(&self) -> Result<PipeEnds, ProcessingError> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Err(ProcessingError::PipeConnect("pipe already connected".to_string()));
        }
        Ok(PipeEnds {
            writer: PipeWriter {
                shared: Arc::clone(&self.shared),
            },
            reader: PipeReader {
                shared: Arc::clone(&self.shared),
            },
            guard: PipeGuard {
                shared: Arc::clone(&self.shared),
            },
        })
    }
}

impl Default for BodyPipe {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer end.
#[derive(Debug)]
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Signal end of stream. The consumer reads the remaining bytes, then EOF.
    pub fn close(self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if let Some(reason) = &state.aborted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
        }
        state.writer_closed = true;
        drop(state);
        self.shared.readable.notify_all();
        Ok(())
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();
        loop {
            if let Some(reason) = &state.aborted {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
            }
            if state.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe closed by reader",
                ));
            }
            if state.buf.len() < self.shared.capacity {
                break;
            }
            self.shared.writable.wait(&mut state);
        }
        let n = (self.shared.capacity - state.buf.len()).min(data.len());
        state.buf.extend(&data[..n]);
        drop(state);
        self.shared.readable.notify_one();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumer end.
#[derive(Debug)]
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();
        loop {
            if let Some(reason) = &state.aborted {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
            }
            if !state.buf.is_empty() {
                break;
            }
            if state.writer_closed {
                return Ok(0);
            }
            self.shared.readable.wait(&mut state);
        }
        let n = state.buf.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
            *dst = src;
        }
        drop(state);
        self.shared.writable.notify_one();
        Ok(n)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.state.lock().reader_closed = true;
        self.shared.writable.notify_all();
    }
}

/// Aborts the pipe when asked to, or when dropped.
#[derive(Debug)]
pub struct PipeGuard {
    shared: Arc<Shared>,
}

impl PipeGuard {
    pub fn abort(&self, reason: &str) {
        self.shared.abort(reason);
    }

    /// Whether the consumer end has been dropped.
    pub fn consumer_closed(&self) -> bool {
        self.shared.state.lock().reader_closed
    }
}

impl Drop for PipeGuard {
    fn drop(&mut self) {
        self.shared.abort("request body pipe aborted");
    }
}
