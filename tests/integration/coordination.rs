//! Mutex/Condition coordination between tasks running on real workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use flowtask::{Condition, Mutex, Runner, RunnerConfig, TaskHandle};

#[test]
fn critical_sections_from_pool_tasks_do_not_lose_updates() {
    let pool = Runner::parallel_with(RunnerConfig {
        num_workers: 4,
        ..RunnerConfig::default()
    });
    let mutex = Mutex::new();
    let counter = Arc::new(parking_lot::Mutex::new(0u64));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            pool.schedule(move || {
                for _ in 0..25 {
                    mutex.critical_section(|| {
                        let value = *counter.lock();
                        thread::yield_now();
                        *counter.lock() = value + 1;
                    });
                }
                Ok(())
            })
        })
        .collect();

    let handles: Vec<TaskHandle> = tasks.iter().map(TaskHandle::from).collect();
    pool.await_all(&handles).unwrap();
    assert_eq!(*counter.lock(), 200);
    assert!(pool.dispose());
}

#[test]
fn producer_and_consumer_tasks_meet_through_a_condition() {
    let pool = Runner::parallel_with(RunnerConfig {
        num_workers: 2,
        ..RunnerConfig::default()
    });
    let mutex = Mutex::new();
    let condition: Arc<Condition> = Arc::new(mutex.new_condition());
    let items = Arc::new(parking_lot::Mutex::new(VecDeque::new()));

    let consumer = {
        let mutex = mutex.clone();
        let condition = condition.clone();
        let items = items.clone();
        pool.compute(move || {
            let mut sum: u64 = 0;
            let mut received = 0usize;
            while received < 1000 {
                mutex.acquire();
                while items.lock().is_empty() {
                    condition.wait();
                }
                while let Some(value) = items.lock().pop_front() {
                    sum += value;
                    received += 1;
                }
                mutex.release();
            }
            Ok(sum)
        })
    };

    let producer = {
        let mutex = mutex.clone();
        let condition = condition.clone();
        let items = items.clone();
        pool.schedule(move || {
            for value in 1..=1000u64 {
                mutex.acquire();
                items.lock().push_back(value);
                condition.signal_all();
                mutex.release();
            }
            Ok(())
        })
    };

    producer.wait().unwrap();
    assert_eq!(consumer.wait_value().unwrap(), 500_500);
    assert!(pool.dispose());
}

#[test]
fn registry_is_scoped_to_each_worker_execution() {
    let pool = Runner::parallel_with(RunnerConfig {
        num_workers: 2,
        ..RunnerConfig::default()
    });
    let expected = pool.id();
    let hits = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let hits = hits.clone();
            pool.schedule(move || {
                if flowtask::registry::current().map(|r| r.id()) == Some(expected) {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })
        })
        .collect();

    let handles: Vec<TaskHandle> = tasks.iter().map(TaskHandle::from).collect();
    pool.await_all(&handles).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 16);
    assert!(flowtask::registry::current().is_none());
    assert!(pool.dispose());
}
