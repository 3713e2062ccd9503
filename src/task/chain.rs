//! Continuation attachment: `then`, `then_on` and the async-supplier family.

use crate::error::TaskError;
use crate::runner::Runner;

use super::cell::Observer;
use super::Task;

impl<T> Task<T> {
    /// Chain an action continuation on this task's own runner.
    ///
    /// If this task already completed without error, the continuation is
    /// scheduled immediately; otherwise it is recorded as paused and handed
    /// over on completion. If this task failed, the continuation's body never
    /// runs: its incoming error is set and its outgoing error mirrors it.
    pub fn then<F>(
        &self,
        body: F,
    ) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        self.then_on(&self.cell.runner().clone(), body)
    }

    /// Chain an action continuation targeting `runner` instead of this
    /// task's own runner.
    pub fn then_on<F>(
        &self,
        runner: &Runner,
        body: F,
    ) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let (task, cont) = Task::<()>::continuation(runner.clone(), body);
        self.cell.attach(cont);
        task
    }

    /// Chain a value-producing continuation on this task's own runner.
    pub fn then_compute<V, F>(
        &self,
        body: F,
    ) -> Task<V>
    where
        V: Send + 'static,
        F: FnOnce() -> Result<V, TaskError> + Send + 'static,
    {
        self.then_compute_on(&self.cell.runner().clone(), body)
    }

    /// Chain a value-producing continuation targeting `runner`.
    pub fn then_compute_on<V, F>(
        &self,
        runner: &Runner,
        body: F,
    ) -> Task<V>
    where
        V: Send + 'static,
        F: FnOnce() -> Result<V, TaskError> + Send + 'static,
    {
        let (task, cont) = Task::<V>::continuation(runner.clone(), body);
        self.cell.attach(cont);
        task
    }

    /// Chain a supplier that itself produces a task.
    ///
    /// The returned task completes only after the supplier runs without error
    /// *and* the task it returned completes. A failure at either step becomes
    /// the returned task's outgoing error; the inner task's body is only ever
    /// invoked if the supplier succeeded.
    pub fn then_async<F>(
        &self,
        supplier: F,
    ) -> Task
    where
        F: FnOnce() -> Result<Task, TaskError> + Send + 'static,
    {
        self.then_async_on(&self.cell.runner().clone(), supplier)
    }

    /// Same as [`Task::then_async`], with the supplier invocation itself
    /// scheduled on `runner`.
    pub fn then_async_on<F>(
        &self,
        runner: &Runner,
        supplier: F,
    ) -> Task
    where
        F: FnOnce() -> Result<Task, TaskError> + Send + 'static,
    {
        self.then_async_compute_on(runner, supplier)
    }

    /// Value-producing analogue of [`Task::then_async`]: the inner task's
    /// result becomes the returned task's result.
    pub fn then_async_compute<V, F>(
        &self,
        supplier: F,
    ) -> Task<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce() -> Result<Task<V>, TaskError> + Send + 'static,
    {
        self.then_async_compute_on(&self.cell.runner().clone(), supplier)
    }

    /// Value-producing analogue of [`Task::then_async_on`].
    pub fn then_async_compute_on<V, F>(
        &self,
        runner: &Runner,
        supplier: F,
    ) -> Task<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce() -> Result<Task<V>, TaskError> + Send + 'static,
    {
        let outer = Task::<V>::detached(runner.clone());

        // Scheduled on `runner` once the receiver succeeds: run the supplier
        // and wire the inner task's outcome through to `outer`.
        let outer_cell = outer.cell.clone();
        let outer_slot = outer.slot.clone();
        let drive = self.then_on(runner, move || {
            let inner = supplier()?;
            let inner_slot = inner.slot.clone();
            let observer: Observer = Box::new(move |err| match err {
                Some(e) => outer_cell.complete(Err(e)),
                None => {
                    *outer_slot.lock() = inner_slot.lock().clone();
                    outer_cell.complete(Ok(()));
                }
            });
            inner.cell.attach_observer(observer);
            Ok(())
        });

        // A drive failure (supplier error, or the receiver's own failure
        // mirrored through) fails the outer task as well.
        let outer_cell = outer.cell.clone();
        let drive_cell = drive.cell.clone();
        let forward: Observer = Box::new(move |err| {
            if let Some(e) = err {
                if let Some(incoming) = drive_cell.incoming_error() {
                    outer_cell.set_incoming(incoming);
                }
                outer_cell.complete(Err(e));
            }
        });
        drive.cell.attach_observer(forward);

        outer
    }
}
