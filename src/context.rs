//! Cancellation for blocking operations.
//!
//! A [`Context`] is cancelled explicitly or by an optional deadline. Blocking
//! operations race [`Context::done`] and [`Context::timer`] against their own
//! readiness channels in a `crossbeam_channel::select!`.

use crate::error::ContextError;
use crossbeam_channel::{at, bounded, never, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    /// Dropped on cancel, which disconnects every clone of `done`.
    cancel: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

/// Cancellation signal shared by a caller and the operations it starts.
///
/// Clones observe the same cancellation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A context that is done only when cancelled.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A context that is done after `timeout`, or earlier if cancelled.
    /// A timeout too large to represent means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    /// A context that is done at `deadline`, or earlier if cancelled.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancel: Mutex::new(Some(tx)),
                done: rx,
                deadline,
            }),
        }
    }

    /// Cancel the context. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel.lock().take();
    }

    /// Becomes ready (disconnected) once the context is cancelled.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Fires at the deadline; never fires without one.
    pub fn timer(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => at(deadline),
            None => never(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Err(TryRecvError::Disconnected) = self.inner.done.try_recv() {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}
