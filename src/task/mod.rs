//! Tasks: schedulable units of work with completion state and chaining
//!
//! A task is created by exactly one of:
//! [`Runner::schedule`](crate::runner::Runner::schedule) /
//! [`Runner::compute`](crate::runner::Runner::compute), a continuation
//! attachment (`then*`), a combinator
//! ([`Runner::when_all`](crate::runner::Runner::when_all)), or a
//! pre-completed factory (`success` / `value` / `failure`).
//!
//! - [`Task`] - Typed handle; action tasks are `Task<()>`, function tasks
//!   `Task<V>`
//! - [`TaskHandle`] - Untyped view used by combinators
//! - [`TaskState`] - The `Created → (Paused →) Scheduled → Running →
//!   Completed` lifecycle
//!
//! Errors raised inside a body never escape onto the executing thread; they
//! are stored as the task's outgoing error and surface only to explicit
//! observers or as the incoming error of chained continuations.

pub(crate) mod cell;
mod chain;
mod join;

pub use cell::TaskState;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{JoinError, TaskError};
use crate::runner::Runner;

use cell::{BoxedBody, Continuation, TaskCell, Unit, Work};

/// Handle to a scheduled unit of work.
///
/// Cloning is cheap and every clone observes the same underlying task.
/// `Task<()>` (the default) is an action task; `Task<V>` additionally carries
/// a result readable once completed.
pub struct Task<T = ()> {
    pub(crate) cell: Arc<TaskCell>,
    pub(crate) slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state())
            .field("runner", self.cell.runner())
            .finish()
    }
}

impl<T: Send + 'static> Task<T> {
    /// A cell-only task that no queue will ever drive; completed explicitly
    /// by factories, combinators and `then_async` wiring.
    pub(crate) fn detached(runner: Runner) -> Self {
        Self {
            cell: TaskCell::new(runner),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a task plus the queue unit that will drive it.
    pub(crate) fn prepared<F>(
        runner: Runner,
        body: F,
    ) -> (Self, Unit)
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let task = Self::detached(runner);
        let slot = task.slot.clone();
        let work: BoxedBody = Box::new(move || {
            let value = body()?;
            *slot.lock() = Some(value);
            Ok(())
        });
        let unit = Unit {
            cell: task.cell.clone(),
            work: Work::Run(work),
        };
        (task, unit)
    }

    /// Build a task plus the continuation record to attach to a parent.
    pub(crate) fn continuation<F>(
        target: Runner,
        body: F,
    ) -> (Self, Continuation)
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let task = Self::detached(target.clone());
        let slot = task.slot.clone();
        let boxed: BoxedBody = Box::new(move || {
            let value = body()?;
            *slot.lock() = Some(value);
            Ok(())
        });
        let cont = Continuation {
            cell: task.cell.clone(),
            body: boxed,
            target,
        };
        (task, cont)
    }
}

impl<T> Task<T> {
    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// Whether the task has completed. Monotonic: once true, always true.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.cell.is_completed()
    }

    /// The runner that executes (or completed) this task.
    #[inline]
    pub fn runner(&self) -> &Runner {
        self.cell.runner()
    }

    /// Error received from a failed predecessor, if this task is a
    /// continuation. Never set by the task's own body.
    pub fn incoming_error(&self) -> Option<Arc<TaskError>> {
        self.cell.incoming_error()
    }

    /// Error this task raised, or the mirrored incoming error when the body
    /// was skipped because the predecessor failed.
    pub fn outgoing_error(&self) -> Option<Arc<TaskError>> {
        self.cell.outgoing_error()
    }

    /// Number of continuations recorded but not yet handed to their target
    /// runner.
    pub fn paused_count(&self) -> usize {
        self.cell.paused_count()
    }

    /// Untyped view for combinators.
    #[inline]
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            cell: self.cell.clone(),
        }
    }

    /// Block until completed; report the outgoing error if any.
    ///
    /// On a current-thread runner this keeps pumping the runner's own queue
    /// while waiting, so a single-threaded caller cannot deadlock on its own
    /// work.
    pub fn wait(&self) -> Result<(), JoinError> {
        self.cell.block_until_completed();
        match self.cell.outgoing_error() {
            Some(err) => Err(JoinError::Faulted(err)),
            None => Ok(()),
        }
    }
}

impl<T: Clone> Task<T> {
    /// Block until completed and return the produced value.
    pub fn wait_value(&self) -> Result<T, JoinError> {
        self.wait()?;
        let value = self
            .slot
            .lock()
            .clone()
            .expect("completed task holds a result");
        Ok(value)
    }

    /// The produced value, if the task completed without error.
    /// Non-blocking.
    pub fn result(&self) -> Option<T> {
        if !self.cell.is_completed() || self.cell.outgoing_error().is_some() {
            return None;
        }
        self.slot.lock().clone()
    }
}

/// Untyped, cheaply cloneable view of a task, accepted by
/// [`Runner::when_all`](crate::runner::Runner) and
/// [`Runner::await_all`](crate::runner::Runner) regardless of the task's
/// value type.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub(crate) cell: Arc<TaskCell>,
}

impl TaskHandle {
    /// Whether the underlying task has completed.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.cell.is_completed()
    }

    /// The underlying task's outgoing error, if any.
    pub fn outgoing_error(&self) -> Option<Arc<TaskError>> {
        self.cell.outgoing_error()
    }
}

impl<T> From<&Task<T>> for TaskHandle {
    fn from(task: &Task<T>) -> Self {
        TaskHandle {
            cell: task.cell.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
