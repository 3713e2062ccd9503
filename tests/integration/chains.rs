//! Cross-runner chaining through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flowtask::{Runner, RunnerConfig, TaskError, TaskHandle};

fn small_pool() -> Runner {
    Runner::parallel_with(RunnerConfig {
        num_workers: 2,
        ..RunnerConfig::default()
    })
}

#[test]
fn chain_crosses_from_pool_to_manual_runner() {
    let pool = small_pool();
    let manual = Runner::manual();
    let stage = Arc::new(AtomicUsize::new(0));

    let produced = {
        let stage = stage.clone();
        pool.compute(move || {
            stage.store(1, Ordering::SeqCst);
            Ok(10)
        })
    };
    let finished = {
        let stage = stage.clone();
        produced.then_on(&manual, move || {
            stage.store(2, Ordering::SeqCst);
            Ok(())
        })
    };

    produced.wait().unwrap();
    assert_eq!(stage.load(Ordering::SeqCst), 1);
    // The continuation crossed to the manual runner and sits there until
    // pumped.
    while manual.scheduled_count() == 0 {
        std::thread::yield_now();
    }
    assert!(!finished.is_completed());

    manual.drain();
    finished.wait().unwrap();
    assert_eq!(stage.load(Ordering::SeqCst), 2);
    assert!(pool.dispose());
}

#[test]
fn when_all_joins_work_from_two_runners() {
    let pool = small_pool();
    let local = Runner::current_thread();
    let counter = Arc::new(AtomicUsize::new(0));

    let on_pool = {
        let counter = counter.clone();
        pool.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    let on_local = {
        let counter = counter.clone();
        local.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    // Awaiting on the current-thread runner pumps the local task; the pool
    // side completes on its own workers.
    local
        .await_all(&[TaskHandle::from(&on_pool), TaskHandle::from(&on_local)])
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(pool.dispose());
}

#[test]
fn failure_propagates_across_runner_boundary() {
    let pool = small_pool();
    let manual = Runner::manual();

    let failing = pool.schedule(|| Err(TaskError::failed("remote")));
    let skipped = failing.then_on(&manual, || Ok(()));

    assert!(failing.wait().is_err());
    while manual.scheduled_count() == 0 {
        std::thread::yield_now();
    }
    manual.drain();

    assert!(skipped.is_completed());
    assert_eq!(
        *skipped.outgoing_error().unwrap(),
        TaskError::failed("remote")
    );
    assert!(pool.dispose());
}

#[test]
fn async_supplier_bridges_runners() {
    let pool = small_pool();
    let local = Runner::current_thread();

    let head = local.schedule(|| Ok(()));
    let outer = {
        let pool_for_inner = pool.clone();
        head.then_async_compute(move || Ok(pool_for_inner.compute(|| Ok(123))))
    };

    assert_eq!(outer.wait_value().unwrap(), 123);
    assert!(pool.dispose());
}
