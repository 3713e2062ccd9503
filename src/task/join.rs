//! Combinators joining multiple in-flight tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{JoinError, TaskError};
use crate::runner::Runner;

use super::cell::Observer;
use super::{Task, TaskHandle};

impl Runner {
    /// A task that completes once every argument task has completed.
    ///
    /// If several arguments fail, the combinator surfaces the error of the
    /// earliest-completing failure; each argument keeps its own completion
    /// status regardless.
    ///
    /// # Panics
    ///
    /// Panics if `tasks` is empty — callers must pass at least one task.
    pub fn when_all(
        &self,
        tasks: &[TaskHandle],
    ) -> Task {
        assert!(
            !tasks.is_empty(),
            "when_all requires at least one task"
        );

        let combined = Task::<()>::detached(self.clone());
        let remaining = Arc::new(AtomicUsize::new(tasks.len()));
        let first_err: Arc<Mutex<Option<Arc<TaskError>>>> = Arc::new(Mutex::new(None));

        trace!("when_all joining {} task(s)", tasks.len());

        for handle in tasks {
            let cell = combined.cell.clone();
            let remaining = remaining.clone();
            let first_err = first_err.clone();
            let observer: Observer = Box::new(move |err| {
                if let Some(e) = err {
                    let mut slot = first_err.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let err = first_err.lock().clone();
                    cell.complete(match err {
                        Some(e) => Err(e),
                        None => Ok(()),
                    });
                }
            });
            handle.cell.attach_observer(observer);
        }

        combined
    }

    /// Block until every argument task has completed; report the error of
    /// the earliest-completing failure, if any.
    ///
    /// The blocking equivalent of [`Runner::when_all`] — no chainable task
    /// is returned.
    ///
    /// # Panics
    ///
    /// Panics if `tasks` is empty.
    pub fn await_all(
        &self,
        tasks: &[TaskHandle],
    ) -> Result<(), JoinError> {
        self.when_all(tasks).wait()
    }
}
