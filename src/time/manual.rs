//! Test-controlled clock that advances only when explicitly told to.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TaskError;
use crate::runner::Runner;
use crate::sync::Gate;
use crate::task::cell::{Unit, Work};
use crate::task::Task;

use super::{Clock, TimePoint};

struct PendingEntry {
    due: TimePoint,
    seq: u64,
    unit: Unit,
}

struct ManualInner {
    now: TimePoint,
    next_seq: u64,
    pending: Vec<PendingEntry>,
    /// Gates parked through [`Clock::park`]; every advance opens them so
    /// timed waiters re-check their deadlines against the new time.
    watchers: Vec<Arc<Gate>>,
}

/// A clock whose time moves only via [`ManualClock::advance`].
///
/// Deferred jobs are bound to one runner: advancing past a deadline moves
/// the due entries onto that runner's queue, in registration order, without
/// executing anything inline. Pumping the runner is the test's business.
pub struct ManualClock {
    runner: Runner,
    inner: Mutex<ManualInner>,
}

impl std::fmt::Debug for ManualClock {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ManualClock")
            .field("now", &inner.now)
            .field("pending", &inner.pending.len())
            .field("runner", &self.runner)
            .finish()
    }
}

impl ManualClock {
    /// A clock at time zero, bound to `runner` for deferred jobs.
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            inner: Mutex::new(ManualInner {
                now: TimePoint::ZERO,
                next_seq: 0,
                pending: Vec::new(),
                watchers: Vec::new(),
            }),
        }
    }

    /// The runner deferred jobs are enqueued on.
    #[inline]
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Number of registered not-yet-due entries.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Move time forward by `delta`.
    ///
    /// Every entry whose deadline is reached is moved onto the bound
    /// runner's queue — never executed inline — ordered by deadline, then by
    /// registration order for entries due at the same instant. All parked
    /// timed waiters are woken to re-check their deadlines. A zero delta is
    /// a no-op.
    pub fn advance(
        &self,
        delta: Duration,
    ) {
        if delta.is_zero() {
            return;
        }

        let (due, watchers, now) = {
            let mut inner = self.inner.lock();
            inner.now = inner.now + delta;
            let now = inner.now;

            let mut due: Vec<PendingEntry> = Vec::new();
            let mut i = 0;
            while i < inner.pending.len() {
                if inner.pending[i].due <= now {
                    due.push(inner.pending.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            due.sort_by_key(|e| (e.due, e.seq));

            let watchers = std::mem::take(&mut inner.watchers);
            (due, watchers, now)
        };

        debug!(
            "manual clock advanced to {}, {} entr(ies) due",
            now,
            due.len()
        );

        for entry in due {
            self.runner.enqueue(entry.unit);
        }
        for gate in watchers {
            gate.open();
        }
    }

    /// Register `body` to run `delay` after the current time.
    ///
    /// A zero delay executes `body` immediately on the calling thread and
    /// returns an already-completed task.
    pub fn schedule_after<F>(
        &self,
        delay: Duration,
        body: F,
    ) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let at = self.now() + delay;
        self.schedule_at(at, body)
    }

    /// Register `body` to run once the clock reaches `at`.
    ///
    /// A deadline not after the current time executes `body` immediately on
    /// the calling thread and returns an already-completed task.
    pub fn schedule_at<F>(
        &self,
        at: TimePoint,
        body: F,
    ) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if at > inner.now {
                let (task, unit) = Task::<()>::prepared(self.runner.clone(), body);
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.pending.push(PendingEntry { due: at, seq, unit });
                trace!("manual clock registered entry due {}", at);
                return task;
            }
        }

        // Already due: run synchronously, completion state and all.
        let (task, unit) = Task::<()>::prepared(self.runner.clone(), body);
        let outcome = match unit.work {
            Work::Run(body) => body().map_err(Arc::new),
            Work::Mirror(err) => Err(err),
        };
        unit.cell.complete(outcome);
        task
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimePoint {
        self.inner.lock().now
    }

    fn park(
        &self,
        gate: &Arc<Gate>,
        deadline: TimePoint,
    ) {
        let now = {
            let mut inner = self.inner.lock();
            inner.watchers.push(gate.clone());
            inner.now
        };
        // The advance that mattered may have drained the watcher list just
        // before we registered; an expired deadline must not sleep.
        if now >= deadline {
            gate.open();
        }
        gate.wait();
    }
}
