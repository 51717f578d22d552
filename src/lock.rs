//! Bounded critical section shared by the audio thread and the control side.
//!
//! Everything behind a [BookkeepingLock] is plain bookkeeping: queue
//! pointers, tags and flags. Closures passed to [BookkeepingLock::with] must
//! not open, read or close files (or do any other syscall that can block),
//! because the real-time audio thread takes the same lock on every tick.
//! Values that need I/O to dispose of (open streams) are moved out of the
//! closure and dropped by the caller after the lock is released.

use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct BookkeepingLock<T> {
    inner: Mutex<T>,
}

impl<T> BookkeepingLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Runs `f` with exclusive access to the guarded state.
    ///
    /// The guard never escapes the closure, so a caller can't accidentally
    /// keep it alive across a read.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.plock();
        f(&mut guard)
    }
}

/// A panic elsewhere must never take the audio callback down with it, so a
/// poisoned lock is simply recovered.
pub trait PoisonlessLock<T> {
    fn plock(&self) -> MutexGuard<'_, T>;
}

impl<T> PoisonlessLock<T> for Mutex<T> {
    fn plock(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(l) => l,
            Err(e) => e.into_inner(),
        }
    }
}
