//! Error taxonomy for the task engine
//!
//! Two channels exist and never mix:
//!
//! - Recoverable task outcomes ([`TaskError`], [`JoinError`], [`LockError`]):
//!   carried as data on tasks or returned from blocking calls, observable only
//!   by callers that explicitly ask for them.
//! - Contract violations (bad arguments, calling a condition method without
//!   holding its mutex, timed acquire without a bound clock): these panic at
//!   the call site and are never stored or retried.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error raised by a task body.
///
/// Task-body errors never escape the executing thread. They are captured as
/// the task's outgoing error and surface only through [`crate::Task::wait`],
/// the error getters, or as the incoming error of downstream continuations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The body returned an error.
    #[error("{0}")]
    Failed(String),

    /// The body panicked; the payload is the panic message.
    #[error("task body panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Shorthand for a [`TaskError::Failed`] with the given message.
    #[inline]
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }
}

/// Error returned by blocking observers (`wait`, `wait_value`, `await_all`).
///
/// Wraps the original task-body error rather than replacing it, so the
/// original cause stays inspectable through [`std::error::Error::source`]
/// or [`JoinError::cause`].
#[derive(Debug, Error, Clone)]
pub enum JoinError {
    /// The awaited task (or one of the aggregated tasks) failed.
    #[error("awaited task failed")]
    Faulted(#[source] Arc<TaskError>),
}

impl JoinError {
    /// The underlying task-body error.
    #[inline]
    pub fn cause(&self) -> &TaskError {
        match self {
            JoinError::Faulted(e) => e,
        }
    }
}

/// Error returned by timed mutex/condition acquisition.
///
/// Distinct from a task outcome: a timeout is a property of the wait, not of
/// any scheduled work. `waited` is measured against the clock bound to the
/// mutex, so manual clocks report deterministic elapsed time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The deadline elapsed before the lock (or signal) was obtained.
    #[error("timed out after {waited:?}")]
    Timeout {
        /// Clock time spent waiting before giving up.
        waited: Duration,
    },
}
