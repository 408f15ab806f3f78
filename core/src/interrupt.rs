//! Per-thread interruption flag for blocking waits.
//!
//! # Design
//! A thread that blocks in `Connector::send` or `ResponseHandle::wait` can
//! be woken by another thread holding its `Interrupter`. The blocked call
//! then gives up, leaves the flag set for the thread's owner to observe, and
//! returns `ProcessingError::Interrupted`. A flag that is already set when
//! the wait starts interrupts it immediately.

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{self, Either};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct InterruptState {
    flag: AtomicBool,
    notify: Notify,
}

thread_local! {
    static CURRENT: Arc<InterruptState> = Arc::new(InterruptState::default());
}

/// Handle that can interrupt the thread it was obtained on.
#[derive(Debug, Clone)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }
}

/// The interrupter for the calling thread.
pub fn current() -> Interrupter {
    Interrupter {
        state: CURRENT.with(Arc::clone),
    }
}

/// Whether the calling thread's flag is set. Does not clear it.
pub fn is_interrupted() -> bool {
    CURRENT.with(|state| state.flag.load(Ordering::SeqCst))
}

/// Test and clear the calling thread's flag.
pub fn interrupted() -> bool {
    CURRENT.with(|state| state.flag.swap(false, Ordering::SeqCst))
}

/// Marker returned when a wait was cut short by an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Block the calling thread on `fut` until it completes or the thread is
/// interrupted. On interruption the flag is left set.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output, Interrupted> {
    let state = CURRENT.with(Arc::clone);
    futures::executor::block_on(async {
        let mut fut = pin!(fut);
        loop {
            let notified = pin!(state.notify.notified());
            if state.flag.load(Ordering::SeqCst) {
                return Err(Interrupted);
            }
            match future::select(fut.as_mut(), notified).await {
                Either::Left((output, _)) => return Ok(output),
                // Stale wake-ups (flag cleared since `interrupt`) loop back.
                Either::Right(((), _)) => continue,
            }
        }
    })
}
