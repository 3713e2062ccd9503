//! Mutual-exclusion lock with thread ownership and clock-driven timeouts.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use tracing::trace;

use crate::error::LockError;
use crate::sync::condition::Condition;
use crate::sync::Gate;
use crate::time::{Clock, TimePoint};

struct MutexInner {
    owner: Option<ThreadId>,
    waiters: Vec<Arc<Gate>>,
}

pub(crate) struct MutexCore {
    clock: Option<Arc<dyn Clock>>,
    inner: PlMutex<MutexInner>,
}

/// A mutual-exclusion lock: `Free` or `Held(thread)`.
///
/// At most one thread holds the mutex at a time. Re-acquiring as the holder
/// succeeds immediately with flat idempotent ownership: no depth counter,
/// a single [`Mutex::release`] frees the lock.
///
/// Cloning yields another handle to the same lock. The internal blocking
/// mechanism is [`Gate`]-based, not built on `Mutex` itself.
///
/// Binding a [`Clock`] at construction enables the timed variants; their
/// deadlines are computed against that clock, so a
/// [`ManualClock`](crate::time::ManualClock) triggers timeouts
/// deterministically.
#[derive(Clone)]
pub struct Mutex {
    core: Arc<MutexCore>,
}

impl std::fmt::Debug for Mutex {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("owner", &self.core.inner.lock().owner)
            .field("has_clock", &self.core.clock.is_some())
            .finish()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    /// An unheld mutex without timeout support.
    pub fn new() -> Self {
        Self {
            core: Arc::new(MutexCore {
                clock: None,
                inner: PlMutex::new(MutexInner {
                    owner: None,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    /// An unheld mutex whose timed operations measure against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            core: Arc::new(MutexCore {
                clock: Some(clock),
                inner: PlMutex::new(MutexInner {
                    owner: None,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    pub(crate) fn clock(&self) -> Option<&Arc<dyn Clock>> {
        self.core.clock.as_ref()
    }

    /// Block until the mutex is free, then hold it. Immediate when the
    /// calling thread already holds it.
    pub fn acquire(&self) {
        loop {
            let gate = match self.try_take() {
                None => return,
                Some(gate) => gate,
            };
            gate.wait();
        }
    }

    /// Non-blocking acquire: true when free or already held by the caller,
    /// false (and no state change) when held by another thread.
    pub fn try_acquire(&self) -> bool {
        self.try_take().is_none()
    }

    /// Block until acquired or until `timeout` elapses on the bound clock.
    ///
    /// # Panics
    ///
    /// Panics if the mutex was constructed without a clock.
    pub fn acquire_for(
        &self,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let clock = self.require_clock().clone();
        let start = clock.now();
        self.acquire_with_deadline(&clock, start, start + timeout)
    }

    /// Block until acquired or until the bound clock reaches `deadline`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex was constructed without a clock.
    pub fn acquire_until(
        &self,
        deadline: TimePoint,
    ) -> Result<(), LockError> {
        let clock = self.require_clock().clone();
        let start = clock.now();
        self.acquire_with_deadline(&clock, start, deadline)
    }

    /// Release the mutex. A no-op, not an error, when the calling thread
    /// does not hold it. Wakes every waiter; they race to re-acquire.
    pub fn release(&self) {
        let woken = {
            let mut inner = self.core.inner.lock();
            if inner.owner != Some(thread::current().id()) {
                return;
            }
            inner.owner = None;
            std::mem::take(&mut inner.waiters)
        };
        trace!("mutex released, {} waiter(s) woken", woken.len());
        for gate in woken {
            gate.open();
        }
    }

    /// Acquire, run `body`, release — the release happens even if `body`
    /// panics, and the panic then propagates to the caller.
    pub fn critical_section<R>(
        &self,
        body: impl FnOnce() -> R,
    ) -> R {
        self.acquire();
        let _release = ReleaseGuard { mutex: self };
        body()
    }

    /// Timed variant of [`Mutex::critical_section`].
    ///
    /// # Panics
    ///
    /// Panics if the mutex was constructed without a clock.
    pub fn critical_section_for<R>(
        &self,
        timeout: Duration,
        body: impl FnOnce() -> R,
    ) -> Result<R, LockError> {
        self.acquire_for(timeout)?;
        let _release = ReleaseGuard { mutex: self };
        Ok(body())
    }

    /// Whether any thread holds the mutex. Never blocks.
    pub fn is_acquired(&self) -> bool {
        self.core.inner.lock().owner.is_some()
    }

    /// Whether the calling thread holds the mutex. Never blocks.
    pub fn is_acquired_by_current_thread(&self) -> bool {
        self.core.inner.lock().owner == Some(thread::current().id())
    }

    /// A condition permanently bound to this mutex.
    pub fn new_condition(&self) -> Condition {
        Condition::bound_to(self.clone())
    }

    /// Take the lock if possible; otherwise register and return a wait gate.
    fn try_take(&self) -> Option<Arc<Gate>> {
        let mut inner = self.core.inner.lock();
        match inner.owner {
            None => {
                inner.owner = Some(thread::current().id());
                None
            }
            Some(owner) if owner == thread::current().id() => None,
            Some(_) => {
                let gate = Arc::new(Gate::new());
                inner.waiters.push(gate.clone());
                Some(gate)
            }
        }
    }

    fn acquire_with_deadline(
        &self,
        clock: &Arc<dyn Clock>,
        start: TimePoint,
        deadline: TimePoint,
    ) -> Result<(), LockError> {
        loop {
            let gate = match self.try_take() {
                None => return Ok(()),
                Some(gate) => gate,
            };
            let now = clock.now();
            if now >= deadline {
                self.remove_waiter(&gate);
                return Err(LockError::Timeout {
                    waited: now.saturating_since(start),
                });
            }
            clock.park(&gate, deadline);
            // The gate is spent either way; a fresh one is registered on the
            // next pass if the lock is still held.
            self.remove_waiter(&gate);
        }
    }

    fn remove_waiter(
        &self,
        gate: &Arc<Gate>,
    ) {
        let mut inner = self.core.inner.lock();
        inner.waiters.retain(|g| !Arc::ptr_eq(g, gate));
    }

    fn require_clock(&self) -> &Arc<dyn Clock> {
        self.core
            .clock
            .as_ref()
            .expect("timed acquire on a mutex constructed without a clock")
    }
}

struct ReleaseGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
