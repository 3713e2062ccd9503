//! Minimal boolean latch for hand-synchronizing threads.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A sticky open/closed latch.
///
/// Starts closed; [`Gate::open`] opens it permanently. Waiting on an open
/// gate returns immediately, which makes the gate safe against lost wakeups:
/// an opener racing ahead of a waiter still lets the waiter through.
///
/// This is the lowest-level blocking primitive in the crate. The task
/// engine's await paths, [`crate::sync::Mutex`]'s wait set and the manual
/// clock's watcher list are all built on it.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    /// Create a closed gate.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate and wake every waiter. Idempotent.
    pub fn open(&self) {
        let mut open = self.open.lock();
        if !*open {
            *open = true;
            self.cv.notify_all();
        }
    }

    /// Whether the gate has been opened.
    #[inline]
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the gate opens.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }

    /// Block until the gate opens or `timeout` real time elapses.
    ///
    /// Returns whether the gate is open.
    pub fn wait_for(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut open = self.open.lock();
        while !*open {
            if self.cv.wait_until(&mut open, deadline).timed_out() {
                return *open;
            }
        }
        true
    }
}
