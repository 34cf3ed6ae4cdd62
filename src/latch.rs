//! This module provides the two scheduling primitives the scheduler needs,
//! called latches.
//!
//! A latch is a way to block some logic from progressing. All latches begin
//! "closed". When the latch is "opened", the logic progresses.
//!
//! [`Latch`] is the "write-side" of the api and defines a single function,
//! [`Latch::set`], which opens the latch. [`Probe`] is the "read-side", which
//! lets a thread check if the latch is open without blocking.
//!
//! Worker threads poll an [`AtomicLatch`] to learn when they should
//! terminate. The root driver blocks on a [`LockLatch`] until the root task
//! has been joined.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

// -----------------------------------------------------------------------------
// Latches and probes

/// The "write-side" of the latch api.
pub trait Latch {
    /// Opens the latch.
    ///
    /// # Safety
    ///
    /// Opening a latch may cause another thread to wake up and deallocate the
    /// latch. This function operates on `*const Self` instead of `&self` to
    /// allow it to become dangling during this call. The caller must ensure
    /// that the pointer is valid upon entry.
    ///
    /// Implementers must not touch `this` after the side-effect that lets the
    /// blocked logic progress.
    unsafe fn set(this: *const Self);
}

/// The "read-side" of the latch api.
pub trait Probe {
    /// Returns `true` if the latch is open, and `false` if it is closed.
    fn probe(&self) -> bool;
}

// -----------------------------------------------------------------------------
// Atomic latch

/// A simple latch implemented using an atomic bool.
pub struct AtomicLatch {
    /// The state of the latch, `true` for open and `false` for closed.
    state: AtomicBool,
}

impl AtomicLatch {
    /// Creates a new closed latch.
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }
}

impl Default for AtomicLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch for AtomicLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: We assume the pointer is valid when passed in. We do not use
        // it after the atomic store so it is fine if it becomes dangling.
        unsafe {
            (*this).state.store(true, Ordering::Release);
        }
    }
}

impl Probe for AtomicLatch {
    #[inline]
    fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Mutex-lock latch

/// A latch that can be used to block a thread, implemented using a mutex.
pub struct LockLatch {
    mutex: Mutex<bool>,
    cond: Condvar,
}

impl LockLatch {
    /// Creates a new closed latch.
    #[inline]
    pub const fn new() -> LockLatch {
        LockLatch {
            mutex: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Waits for the latch to open by blocking the thread.
    pub fn wait(&self) {
        let mut guard = self.mutex.lock();
        while !*guard {
            self.cond.wait(&mut guard);
        }
    }
}

impl Default for LockLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch for LockLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: We assume the pointer is valid when passed in. The waiter
        // cannot return from `wait` until it re-acquires the mutex, which only
        // happens after the guard below is dropped, so the pointer remains
        // valid for the entire block.
        unsafe {
            let mut guard = (*this).mutex.lock();
            *guard = true;
            (*this).cond.notify_all();
        }
    }
}

impl Probe for LockLatch {
    #[inline]
    fn probe(&self) -> bool {
        *self.mutex.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn atomic_latch_opens_once_set() {
        let latch = AtomicLatch::new();
        assert!(!latch.probe());
        // SAFETY: The latch lives on this stack frame for the whole test.
        unsafe { Latch::set(&latch) };
        assert!(latch.probe());
    }

    #[test]
    fn lock_latch_releases_a_waiting_thread() {
        let latch = Arc::new(LockLatch::new());
        let setter = Arc::clone(&latch);
        let handle = thread::spawn(move || {
            // SAFETY: The arc keeps the latch alive for the duration of the call.
            unsafe { Latch::set(&*setter) };
        });
        latch.wait();
        assert!(latch.probe());
        handle.join().unwrap();
    }
}
