//! Manual-clock driven flows: deferred work and deterministic timeouts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flowtask::{Clock, LockError, ManualClock, Mutex, Runner, TimePoint};

#[test]
fn deferred_work_runs_once_pumped() {
    let runner = Runner::manual();
    let clock = ManualClock::new(runner.clone());
    let fired = Arc::new(AtomicUsize::new(0));

    let task = {
        let fired = fired.clone();
        clock.schedule_after(Duration::from_millis(50), move || {
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    clock.advance(Duration::from_millis(49));
    assert_eq!(runner.scheduled_count(), 0);

    clock.advance(Duration::from_millis(1));
    assert_eq!(runner.scheduled_count(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    runner.drain();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    task.wait().unwrap();
}

#[test]
fn deferred_chain_follows_clock_then_queue() {
    let runner = Runner::manual();
    let clock = ManualClock::new(runner.clone());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let deferred = {
        let order = order.clone();
        clock.schedule_after(Duration::from_millis(10), move || {
            order.lock().push("timer");
            Ok(())
        })
    };
    {
        let order = order.clone();
        deferred.then(move || {
            order.lock().push("chained");
            Ok(())
        });
    }

    clock.advance(Duration::from_millis(10));
    runner.drain();
    assert_eq!(*order.lock(), vec!["timer", "chained"]);
}

#[test]
fn contended_timed_acquire_expires_on_the_clock() {
    let clock = Arc::new(ManualClock::new(Runner::manual()));
    let mutex = Mutex::with_clock(clock.clone());
    let done = Arc::new(AtomicBool::new(false));

    mutex.acquire();
    let call_time = clock.now();

    let contender = {
        let mutex = mutex.clone();
        let done = done.clone();
        thread::spawn(move || {
            let outcome = mutex.acquire_for(Duration::from_secs(1));
            done.store(true, Ordering::SeqCst);
            outcome
        })
    };

    // The lock is never released; only clock movement can end the wait.
    while !done.load(Ordering::SeqCst) {
        clock.advance(Duration::from_secs(1));
        thread::sleep(Duration::from_millis(5));
    }

    match contender.join().unwrap() {
        Err(LockError::Timeout { waited }) => {
            assert!(waited >= Duration::from_secs(1));
            assert!(clock.now().saturating_since(call_time) >= Duration::from_secs(1));
        }
        Ok(()) => panic!("the lock was never released"),
    }
    mutex.release();
}

#[test]
fn deadline_acquire_uses_absolute_clock_time() {
    let clock = Arc::new(ManualClock::new(Runner::manual()));
    let mutex = Mutex::with_clock(clock.clone());
    let done = Arc::new(AtomicBool::new(false));
    clock.advance(Duration::from_secs(5));

    mutex.acquire();
    let contender = {
        let mutex = mutex.clone();
        let done = done.clone();
        thread::spawn(move || {
            let outcome = mutex.acquire_until(TimePoint::from_epoch(Duration::from_secs(6)));
            done.store(true, Ordering::SeqCst);
            outcome
        })
    };

    while !done.load(Ordering::SeqCst) {
        clock.advance(Duration::from_secs(1));
        thread::sleep(Duration::from_millis(5));
    }

    assert!(matches!(
        contender.join().unwrap(),
        Err(LockError::Timeout { .. })
    ));
    mutex.release();
}
