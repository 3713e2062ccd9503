//! Runners: execution contexts that own a work queue and a dispatch policy
//!
//! A runner accepts units of work and decides when and where they execute:
//!
//! - [`Runner::manual`] - work sits in the queue until explicitly pumped;
//!   the deterministic choice for tests
//! - [`Runner::current_thread`] - waits on its own tasks pump the queue
//!   inline on the owning thread
//! - [`Runner::parallel`] - a worker-thread pool dequeues and executes
//!   continuously
//!
//! All three share the same [`Task`](crate::task::Task) contract; completion
//! and continuation-transfer logic never sees the difference.
//!
//! The [`registry`] submodule provides the dynamically scoped "current
//! runner" binding.

pub mod registry;

pub(crate) mod queue;
mod worker;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::TaskError;
use crate::sync::Gate;
use crate::task::cell::{BoxedBody, TaskCell, TaskState, Unit, Work};
use crate::task::Task;

use queue::{LocalQueue, PoolQueue, WorkQueue};

/// Process-wide runner id source, for log correlation only.
static RUNNER_IDS: AtomicU64 = AtomicU64::new(0);

/// Configuration for a parallel runner's worker pool.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Stack size per worker thread.
    pub stack_size: usize,
    /// How long an idle worker waits before re-checking for shutdown.
    pub idle_timeout: Duration,
    /// Worker thread name prefix.
    pub thread_name: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let num_cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: num_cpus,
            stack_size: 2 * 1024 * 1024,
            idle_timeout: Duration::from_millis(1),
            thread_name: "flow-worker".to_string(),
        }
    }
}

/// Dispatch policy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    /// Pumped explicitly via `pump_one` / `drain`.
    Manual,
    /// Attached to the creating thread; waits pump inline.
    CurrentThread(ThreadId),
    /// Worker pool drains continuously.
    Parallel,
}

pub(crate) struct RunnerCore {
    id: u64,
    policy: Policy,
    pub(crate) queue: WorkQueue,
    scheduled: AtomicUsize,
    disposed: AtomicBool,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RunnerCore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("scheduled", &self.scheduled.load(Ordering::SeqCst))
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

/// An execution context owning a queue of pending tasks.
///
/// Cheap to clone; every clone is a handle to the same runner.
#[derive(Clone)]
pub struct Runner {
    core: Arc<RunnerCore>,
}

impl std::fmt::Debug for Runner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.core.fmt(f)
    }
}

impl Runner {
    fn with_policy(
        policy: Policy,
        queue: WorkQueue,
    ) -> Self {
        Self {
            core: Arc::new(RunnerCore {
                id: RUNNER_IDS.fetch_add(1, Ordering::SeqCst),
                policy,
                queue,
                scheduled: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
                running: Arc::new(AtomicBool::new(true)),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A runner whose queue is only ever drained by explicit
    /// [`Runner::pump_one`] / [`Runner::drain`] calls.
    pub fn manual() -> Self {
        let runner = Self::with_policy(Policy::Manual, WorkQueue::Local(LocalQueue::new()));
        debug!("runner {} created (manual)", runner.core.id);
        runner
    }

    /// A runner attached to the calling thread. Waiting on one of its tasks
    /// pumps the queue inline until the awaited task completes.
    pub fn current_thread() -> Self {
        let runner = Self::with_policy(
            Policy::CurrentThread(thread::current().id()),
            WorkQueue::Local(LocalQueue::new()),
        );
        debug!("runner {} created (current-thread)", runner.core.id);
        runner
    }

    /// A runner backed by a worker-thread pool with default configuration.
    pub fn parallel() -> Self {
        Self::parallel_with(RunnerConfig::default())
    }

    /// A runner backed by a worker-thread pool.
    pub fn parallel_with(config: RunnerConfig) -> Self {
        let runner = Self::with_policy(Policy::Parallel, WorkQueue::Pool(PoolQueue::new()));
        worker::spawn_workers(&runner.core, &config);
        debug!(
            "runner {} created (parallel, {} workers)",
            runner.core.id, config.num_workers
        );
        runner
    }

    pub(crate) fn from_core(core: Arc<RunnerCore>) -> Self {
        Self { core }
    }

    /// Log-correlation id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Schedule an action for execution; returns its task handle in
    /// `Scheduled` state.
    ///
    /// # Panics
    ///
    /// Panics if the runner has been disposed.
    pub fn schedule<F>(
        &self,
        body: F,
    ) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        self.assert_open();
        let (task, unit) = Task::<()>::prepared(self.clone(), body);
        self.enqueue(unit);
        trace!("runner {} scheduled action task", self.core.id);
        task
    }

    /// Schedule a value-producing function; returns its typed task handle.
    ///
    /// # Panics
    ///
    /// Panics if the runner has been disposed.
    pub fn compute<T, F>(
        &self,
        body: F,
    ) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        self.assert_open();
        let (task, unit) = Task::<T>::prepared(self.clone(), body);
        self.enqueue(unit);
        trace!("runner {} scheduled function task", self.core.id);
        task
    }

    /// An already-completed action task. Never touches the queue.
    pub fn success(&self) -> Task {
        self.value(())
    }

    /// An already-completed function task holding `value`. Never touches
    /// the queue.
    pub fn value<T: Send + 'static>(
        &self,
        value: T,
    ) -> Task<T> {
        let task = Task::<T>::detached(self.clone());
        *task.slot.lock() = Some(value);
        task.cell.complete(Ok(()));
        task
    }

    /// An already-failed task carrying `err` as its outgoing error. Never
    /// touches the queue.
    pub fn failure(
        &self,
        err: TaskError,
    ) -> Task {
        let task = Task::<()>::detached(self.clone());
        task.cell.complete(Err(Arc::new(err)));
        task
    }

    /// Teardown signaling hook: schedules a unit that flips `cell` to true,
    /// so observing the flip proves the queue position drained.
    pub fn mark_completed(
        &self,
        cell: &Arc<AtomicBool>,
    ) -> Task {
        let cell = cell.clone();
        self.schedule(move || {
            cell.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Number of scheduled-but-not-yet-executed queue entries.
    pub fn scheduled_count(&self) -> usize {
        self.core.scheduled.load(Ordering::SeqCst)
    }

    /// Whether [`Runner::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::SeqCst)
    }

    /// Execute the next queued entry on the calling thread, if any.
    ///
    /// # Panics
    ///
    /// Panics on a parallel runner; its pool owns the queue.
    pub fn pump_one(&self) -> bool {
        match &self.core.queue {
            WorkQueue::Local(q) => match q.pop() {
                Some(unit) => {
                    self.run_unit(unit);
                    true
                }
                None => false,
            },
            WorkQueue::Pool(_) => {
                panic!("pump on a parallel runner; its worker pool owns the queue")
            }
        }
    }

    /// Execute queued entries until the queue is empty, including entries
    /// enqueued while draining. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while self.pump_one() {
            executed += 1;
        }
        executed
    }

    /// Stop accepting scheduled work and release owned thread resources.
    ///
    /// Queued-but-unexecuted work is abandoned. Idempotent: the first call
    /// returns true, every later call false. Never panics when nothing was
    /// ever scheduled.
    pub fn dispose(&self) -> bool {
        if self.core.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!("runner {} disposing", self.core.id);
        self.core.shutdown();
        true
    }

    fn assert_open(&self) {
        assert!(
            !self.core.disposed.load(Ordering::SeqCst),
            "schedule on a disposed runner"
        );
    }

    /// Queue entry intake shared by `schedule`, continuation hand-off and
    /// the manual clock. Exactly-once per unit: the caller transfers
    /// ownership and never re-enqueues.
    pub(crate) fn enqueue(
        &self,
        unit: Unit,
    ) {
        if self.core.disposed.load(Ordering::SeqCst) {
            warn!(
                "runner {} disposed, dropping handed-off unit",
                self.core.id
            );
            return;
        }
        unit.cell.set_state(TaskState::Scheduled);
        self.core.scheduled.fetch_add(1, Ordering::SeqCst);
        match &self.core.queue {
            WorkQueue::Local(q) => q.push(unit),
            WorkQueue::Pool(p) => {
                if !p.push(unit) {
                    self.core.scheduled.fetch_sub(1, Ordering::SeqCst);
                    warn!("runner {} pool closed, dropping unit", self.core.id);
                }
            }
        }
    }

    /// Execute one unit: run (or skip) the body with the registry bound,
    /// settle the bookkeeping, complete the cell.
    pub(crate) fn run_unit(
        &self,
        unit: Unit,
    ) {
        unit.cell.set_state(TaskState::Running);
        let outcome = match unit.work {
            Work::Run(body) => registry::enter(self, || execute_body(body)),
            Work::Mirror(err) => Err(err),
        };
        self.core.scheduled.fetch_sub(1, Ordering::SeqCst);
        unit.cell.complete(outcome);
    }

    /// Block until `cell` completes. A current-thread runner pumps its own
    /// queue from its owning thread while waiting; everything else parks on
    /// a completion gate.
    pub(crate) fn wait_for_cell(
        &self,
        cell: &TaskCell,
    ) {
        let pump_inline = match self.core.policy {
            Policy::CurrentThread(owner) => owner == thread::current().id(),
            Policy::Manual | Policy::Parallel => false,
        };

        loop {
            if cell.is_completed() {
                return;
            }
            if pump_inline && self.pump_one() {
                continue;
            }
            let gate = Arc::new(Gate::new());
            cell.subscribe(&gate);
            if pump_inline {
                // Wake on new queue entries too; a continuation from another
                // thread may land here and need pumping before `cell` can
                // complete.
                if let WorkQueue::Local(q) = &self.core.queue {
                    q.subscribe(&gate);
                }
            }
            gate.wait();
        }
    }
}

impl RunnerCore {
    /// Release queue contents and thread resources. Called once, from
    /// `dispose` or from the drop of an abandoned runner.
    fn shutdown(&self) {
        match &self.queue {
            WorkQueue::Local(q) => {
                let abandoned = q.clear();
                if abandoned > 0 {
                    self.scheduled.fetch_sub(abandoned, Ordering::SeqCst);
                    warn!("runner {} abandoned {} queued task(s)", self.id, abandoned);
                }
            }
            WorkQueue::Pool(p) => {
                self.running.store(false, Ordering::SeqCst);
                p.close();
                let current = thread::current().id();
                for handle in self.workers.lock().drain(..) {
                    // A worker can trigger shutdown by dropping the last
                    // strong reference; it must not join itself.
                    if handle.thread().id() == current {
                        continue;
                    }
                    handle.join().expect("worker thread panicked");
                }
                let abandoned = p.drain_remaining();
                if abandoned > 0 {
                    self.scheduled.fetch_sub(abandoned, Ordering::SeqCst);
                    warn!("runner {} abandoned {} queued task(s)", self.id, abandoned);
                }
            }
        }
        debug!("runner {} shut down", self.id);
    }
}

impl Drop for RunnerCore {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

fn execute_body(body: BoxedBody) -> Result<(), Arc<TaskError>> {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Arc::new(err)),
        Err(payload) => Err(Arc::new(TaskError::Panicked(panic_message(
            payload.as_ref(),
        )))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
