//! Shared task cell: completion state, error slots, continuation transfer.
//!
//! A cell is the untyped heart of a task. Typed [`Task`](super::Task) handles
//! share one cell; the runner's queue holds [`Unit`]s that drive a cell
//! through `Running` to `Completed`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::TaskError;
use crate::runner::Runner;
use crate::sync::Gate;

/// Task lifecycle state.
///
/// `Created → Scheduled → Running → Completed`, with `Paused` inserted before
/// `Scheduled` for continuations recorded before their parent completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Built but not yet handed to any queue.
    Created,
    /// Recorded as a continuation of a parent that has not completed.
    Paused,
    /// Sitting in its target runner's queue.
    Scheduled,
    /// Body executing.
    Running,
    /// Outcome recorded; terminal.
    Completed,
}

impl TaskState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => TaskState::Created,
            1 => TaskState::Paused,
            2 => TaskState::Scheduled,
            3 => TaskState::Running,
            4 => TaskState::Completed,
            _ => TaskState::Created,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            TaskState::Created => 0,
            TaskState::Paused => 1,
            TaskState::Scheduled => 2,
            TaskState::Running => 3,
            TaskState::Completed => 4,
        }
    }
}

/// A task body, type-erased. Value-producing bodies store their result into
/// the typed slot before returning.
pub(crate) type BoxedBody = Box<dyn FnOnce() -> Result<(), TaskError> + Send>;

/// Completion observer, fired exactly once with the cell's outgoing error.
pub(crate) type Observer = Box<dyn FnOnce(Option<Arc<TaskError>>) + Send>;

/// What a queue entry does when the runner reaches it.
pub(crate) enum Work {
    /// Execute the body.
    Run(BoxedBody),
    /// Predecessor failed: skip the body, outgoing error mirrors incoming.
    Mirror(Arc<TaskError>),
}

impl std::fmt::Debug for Work {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Work::Run(_) => f.write_str("Work::Run"),
            Work::Mirror(e) => f.debug_tuple("Work::Mirror").field(e).finish(),
        }
    }
}

/// A ready-to-run queue entry driving one cell.
#[derive(Debug)]
pub(crate) struct Unit {
    pub(crate) cell: Arc<TaskCell>,
    pub(crate) work: Work,
}

/// A continuation recorded on its parent but not yet handed to a queue.
pub(crate) struct Continuation {
    pub(crate) cell: Arc<TaskCell>,
    pub(crate) body: BoxedBody,
    pub(crate) target: Runner,
}

struct CellInner {
    incoming: Option<Arc<TaskError>>,
    outgoing: Option<Arc<TaskError>>,
    paused: SmallVec<[Continuation; 2]>,
    observers: SmallVec<[Observer; 1]>,
    waiters: SmallVec<[Arc<Gate>; 2]>,
}

/// Untyped task core shared by every handle to the same task.
pub(crate) struct TaskCell {
    /// Current state (atomic for lock-free observers).
    state: AtomicU8,
    /// Runner that executes (or observed the completion of) this task.
    runner: Runner,
    inner: Mutex<CellInner>,
}

impl std::fmt::Debug for TaskCell {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskCell")
            .field("state", &self.state())
            .field("runner", &self.runner)
            .finish()
    }
}

impl TaskCell {
    /// A fresh cell in `Created` state targeting `runner`.
    pub(crate) fn new(runner: Runner) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(TaskState::Created.as_u8()),
            runner,
            inner: Mutex::new(CellInner {
                incoming: None,
                outgoing: None,
                paused: SmallVec::new(),
                observers: SmallVec::new(),
                waiters: SmallVec::new(),
            }),
        })
    }

    #[inline]
    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn set_state(
        &self,
        state: TaskState,
    ) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Monotonic: once true, stays true.
    #[inline]
    pub(crate) fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    #[inline]
    pub(crate) fn runner(&self) -> &Runner {
        &self.runner
    }

    pub(crate) fn incoming_error(&self) -> Option<Arc<TaskError>> {
        self.inner.lock().incoming.clone()
    }

    pub(crate) fn outgoing_error(&self) -> Option<Arc<TaskError>> {
        self.inner.lock().outgoing.clone()
    }

    pub(crate) fn set_incoming(
        &self,
        err: Arc<TaskError>,
    ) {
        self.inner.lock().incoming = Some(err);
    }

    pub(crate) fn paused_count(&self) -> usize {
        self.inner.lock().paused.len()
    }

    /// Record `cont` as paused, or hand it off right away when this cell has
    /// already completed. Attachment order is preserved for paused
    /// continuations sharing a target runner.
    pub(crate) fn attach(
        &self,
        cont: Continuation,
    ) {
        let mut inner = self.inner.lock();
        if self.is_completed() {
            let out = inner.outgoing.clone();
            drop(inner);
            dispatch_continuation(cont, out);
        } else {
            cont.cell.set_state(TaskState::Paused);
            inner.paused.push(cont);
        }
    }

    /// Run `observer` with the outgoing error once completed; immediately if
    /// already completed. Internal building block for `then_async` and
    /// `when_all`.
    pub(crate) fn attach_observer(
        &self,
        observer: Observer,
    ) {
        let mut inner = self.inner.lock();
        if self.is_completed() {
            let out = inner.outgoing.clone();
            drop(inner);
            observer(out);
        } else {
            inner.observers.push(observer);
        }
    }

    /// Open `gate` on completion; immediately if already completed.
    pub(crate) fn subscribe(
        &self,
        gate: &Arc<Gate>,
    ) {
        let mut inner = self.inner.lock();
        if self.is_completed() {
            gate.open();
        } else {
            inner.waiters.push(gate.clone());
        }
    }

    /// Completion protocol: record the outcome, transfer every paused
    /// continuation to its designated target runner (exactly once, in
    /// attachment order), fire observers, open waiter gates.
    ///
    /// No result or error mutation is possible afterwards.
    pub(crate) fn complete(
        &self,
        outcome: Result<(), Arc<TaskError>>,
    ) {
        let err = outcome.err();
        let (paused, observers, waiters) = {
            let mut inner = self.inner.lock();
            if self.is_completed() {
                // Completion is single-shot; the queue hands each unit to
                // exactly one executor, so a second call cannot happen.
                debug_assert!(false, "task completed twice");
                return;
            }
            inner.outgoing = err.clone();
            self.set_state(TaskState::Completed);
            (
                std::mem::take(&mut inner.paused),
                std::mem::take(&mut inner.observers),
                std::mem::take(&mut inner.waiters),
            )
        };

        trace!(
            "task completed ({}), {} continuation(s) released",
            if err.is_some() { "error" } else { "ok" },
            paused.len()
        );

        for cont in paused {
            dispatch_continuation(cont, err.clone());
        }
        for observer in observers {
            observer(err.clone());
        }
        for gate in waiters {
            gate.open();
        }
    }

    /// Block the calling thread until completed. A current-thread runner
    /// keeps pumping its own queue while waiting.
    pub(crate) fn block_until_completed(&self) {
        if self.is_completed() {
            return;
        }
        let runner = self.runner.clone();
        runner.wait_for_cell(self);
    }
}

/// Hand a fired continuation to its target runner's queue.
///
/// A failed predecessor skips the body: the continuation's incoming error is
/// set and the queued work mirrors it into the outgoing slot unchanged.
pub(crate) fn dispatch_continuation(
    cont: Continuation,
    parent_err: Option<Arc<TaskError>>,
) {
    match parent_err {
        Some(err) => {
            cont.cell.set_incoming(err.clone());
            cont.target.enqueue(Unit {
                cell: cont.cell,
                work: Work::Mirror(err),
            });
        }
        None => {
            cont.target.enqueue(Unit {
                cell: cont.cell,
                work: Work::Run(cont.body),
            });
        }
    }
}
