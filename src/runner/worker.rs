//! Worker threads for parallel runners.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use tracing::trace;

use crate::task::cell::Unit;

use super::queue::WorkQueue;
use super::{Runner, RunnerConfig, RunnerCore};

/// Spawn the pool for a parallel runner and park the join handles on the
/// core. Workers hold only a weak reference so an abandoned runner can still
/// shut itself down on drop.
pub(crate) fn spawn_workers(
    core: &Arc<RunnerCore>,
    config: &RunnerConfig,
) {
    let receiver = match &core.queue {
        WorkQueue::Pool(pool) => pool.receiver(),
        WorkQueue::Local(_) => unreachable!("worker pool over a local queue"),
    };

    let mut handles = Vec::with_capacity(config.num_workers);
    for worker_id in 0..config.num_workers {
        let rx = receiver.clone();
        let running = core.running.clone();
        let weak = Arc::downgrade(core);
        let idle = config.idle_timeout;

        let handle = thread::Builder::new()
            .name(format!("{}-{}", config.thread_name, worker_id))
            .stack_size(config.stack_size)
            .spawn(move || worker_loop(worker_id, rx, running, weak, idle))
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }
    *core.workers.lock() = handles;
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<Unit>,
    running: Arc<std::sync::atomic::AtomicBool>,
    core: Weak<RunnerCore>,
    idle: Duration,
) {
    trace!("worker {} started", worker_id);

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(idle) {
            Ok(unit) => match core.upgrade() {
                Some(core) => Runner::from_core(core).run_unit(unit),
                None => break,
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    trace!("worker {} stopped", worker_id);
}
