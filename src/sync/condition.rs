//! Monitor-style condition variable bound to one [`Mutex`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as PlMutex;
use tracing::trace;

use crate::error::LockError;
use crate::sync::{Gate, Mutex};
use crate::time::Clock;

/// One parked thread. The gate is replaced after a non-signal wakeup (a
/// manual-clock tick opens watcher gates stickily), so only `signaled`
/// decides whether the wait is over.
struct Waiter {
    signaled: AtomicBool,
    gate: PlMutex<Arc<Gate>>,
}

impl Waiter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            signaled: AtomicBool::new(false),
            gate: PlMutex::new(Arc::new(Gate::new())),
        })
    }
}

/// A wait/signal primitive created from and permanently bound to one
/// [`Mutex`].
///
/// Every operation requires the calling thread to hold the bound mutex;
/// violating that is a contract violation (panic), not a runtime race.
pub struct Condition {
    mutex: Mutex,
    waiters: PlMutex<Vec<Arc<Waiter>>>,
}

impl std::fmt::Debug for Condition {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}

impl Condition {
    pub(crate) fn bound_to(mutex: Mutex) -> Self {
        Self {
            mutex,
            waiters: PlMutex::new(Vec::new()),
        }
    }

    /// The mutex this condition is bound to.
    #[inline]
    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    /// Atomically release the bound mutex and block until signaled, then
    /// re-acquire the mutex before returning.
    ///
    /// # Panics
    ///
    /// Panics unless the calling thread holds the bound mutex.
    pub fn wait(&self) {
        self.assert_held();
        let waiter = Waiter::new();
        self.waiters.lock().push(waiter.clone());
        self.mutex.release();

        while !waiter.signaled.load(Ordering::SeqCst) {
            let gate = waiter.gate.lock().clone();
            if waiter.signaled.load(Ordering::SeqCst) {
                break;
            }
            gate.wait();
        }

        self.remove_waiter(&waiter);
        self.mutex.acquire();
    }

    /// Like [`Condition::wait`], but gives up once `timeout` elapses on the
    /// clock bound to the mutex. The mutex is re-acquired before returning,
    /// also on the timeout path.
    ///
    /// # Panics
    ///
    /// Panics unless the calling thread holds the bound mutex, or if the
    /// mutex was constructed without a clock.
    pub fn wait_for(
        &self,
        timeout: Duration,
    ) -> Result<(), LockError> {
        self.assert_held();
        let clock = self
            .mutex
            .clock()
            .expect("timed wait on a condition whose mutex has no clock")
            .clone();
        let start = clock.now();
        let deadline = start + timeout;

        let waiter = Waiter::new();
        self.waiters.lock().push(waiter.clone());
        self.mutex.release();

        let outcome = loop {
            if waiter.signaled.load(Ordering::SeqCst) {
                break Ok(());
            }
            let now = clock.now();
            if now >= deadline {
                break Err(LockError::Timeout {
                    waited: now.saturating_since(start),
                });
            }
            let gate = {
                let mut slot = waiter.gate.lock();
                if slot.is_open() {
                    // Spent by a clock tick; park needs a closed gate.
                    *slot = Arc::new(Gate::new());
                }
                slot.clone()
            };
            clock.park(&gate, deadline);
        };

        // A timed-out waiter leaves the wait set; no phantom wakeup later.
        self.remove_waiter(&waiter);
        self.mutex.acquire();
        outcome
    }

    /// Wake every waiter; each re-acquires the mutex on its own once the
    /// caller releases it.
    ///
    /// # Panics
    ///
    /// Panics unless the calling thread holds the bound mutex.
    pub fn signal_all(&self) {
        self.assert_held();
        let waiters = std::mem::take(&mut *self.waiters.lock());
        trace!("condition signaled, {} waiter(s) woken", waiters.len());
        for waiter in waiters {
            waiter.signaled.store(true, Ordering::SeqCst);
            waiter.gate.lock().open();
        }
    }

    fn remove_waiter(
        &self,
        waiter: &Arc<Waiter>,
    ) {
        let mut waiters = self.waiters.lock();
        waiters.retain(|w| !Arc::ptr_eq(w, waiter));
    }

    fn assert_held(&self) {
        assert!(
            self.mutex.is_acquired_by_current_thread(),
            "condition used by a thread that does not hold its mutex"
        );
    }
}
