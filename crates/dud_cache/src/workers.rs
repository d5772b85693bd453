//! Worker permits and cancellation for parallel directory commits.
//!
//! A [`WorkerPool`] is a bounded channel used as a counting semaphore: sending
//! a unit value takes a slot, and dropping the resulting [`Permit`] frees it.
//! Because acquisition is a channel send, a scheduler can race several pools
//! (and a cancellation signal) in one `crossbeam_channel::select!`.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::CacheError;

/// Default number of workers shared by every directory level of a commit.
pub const MAX_SHARED_WORKERS: usize = 64;

/// Default number of workers reserved for each individual directory.
pub const MAX_DEDICATED_WORKERS: usize = 1;

/// A fixed-size pool of worker slots.
#[derive(Clone, Debug)]
pub(crate) struct WorkerPool {
    slots: Sender<()>,
    returns: Receiver<()>,
}

impl WorkerPool {
    /// Creates a pool with `capacity` slots (at least one).
    pub(crate) fn new(capacity: usize) -> Self {
        let (slots, returns) = bounded(capacity.max(1));
        Self { slots, returns }
    }

    /// The sender to use in a `select!` send arm to take a slot.
    pub(crate) fn slots(&self) -> &Sender<()> {
        &self.slots
    }

    /// Wraps a slot that was just taken through [`WorkerPool::slots`].
    pub(crate) fn permit(&self) -> Permit {
        Permit { pool: self.clone() }
    }
}

/// An acquired worker slot, released on drop.
#[derive(Debug)]
pub(crate) struct Permit {
    pool: WorkerPool,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.pool.returns.try_recv();
    }
}

/// A one-shot cancellation signal observable from `select!`.
///
/// The receiver never yields a value; it becomes ready (disconnected) once
/// [`CancelToken::cancel`] drops the only sender.
#[derive(Clone, Debug)]
pub(crate) struct CancelToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    pub(crate) fn cancel(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver for a `select!` recv arm; fires once cancelled.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

/// Collects the outcome of a set of workers sharing one [`CancelToken`].
///
/// The first failure cancels the token. A real error always wins over the
/// [`CacheError::Cancelled`] reports it provokes in sibling workers.
#[derive(Debug)]
pub(crate) struct TaskGroup {
    cancel: CancelToken,
    error: Mutex<Option<CacheError>>,
}

impl TaskGroup {
    pub(crate) fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            error: Mutex::new(None),
        }
    }

    pub(crate) fn fail(&self, err: CacheError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        let replace = match slot.as_ref() {
            None => true,
            Some(existing) => {
                matches!(existing.root(), CacheError::Cancelled)
                    && !matches!(err.root(), CacheError::Cancelled)
            }
        };
        if replace {
            *slot = Some(err);
        }
        drop(slot);
        self.cancel.cancel();
    }

    /// Returns the recorded error, or `Cancelled` if the shared token fired
    /// because of a failure elsewhere.
    pub(crate) fn finish(self) -> Result<(), CacheError> {
        let error = self
            .error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match error {
            Some(err) => Err(err),
            None if self.cancel.is_cancelled() => Err(CacheError::Cancelled),
            None => Ok(()),
        }
    }
}
