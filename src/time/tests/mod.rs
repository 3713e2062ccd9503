//! Clock unit tests


use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::sync::Gate;
use crate::time::{Clock, RealClock, TimePoint};

#[test]
fn test_time_point_ordering() {
    let a = TimePoint::from_epoch(Duration::from_millis(10));
    let b = TimePoint::from_epoch(Duration::from_millis(20));
    assert!(a < b);
    assert_eq!(a, TimePoint::from_epoch(Duration::from_millis(10)));
    assert!(TimePoint::ZERO < a);
}

#[test]
fn test_time_point_add() {
    let a = TimePoint::from_epoch(Duration::from_millis(10));
    let b = a + Duration::from_millis(5);
    assert_eq!(b.since_epoch(), Duration::from_millis(15));
}

#[test]
fn test_time_point_saturating_since() {
    let a = TimePoint::from_epoch(Duration::from_millis(10));
    let b = TimePoint::from_epoch(Duration::from_millis(25));
    assert_eq!(b.saturating_since(a), Duration::from_millis(15));
    assert_eq!(a.saturating_since(b), Duration::ZERO);
}

#[test]
fn test_real_clock_monotonic() {
    let clock = RealClock::new();
    let first = clock.now();
    let second = clock.now();
    assert!(second >= first);
}

#[test]
fn test_real_clock_park_until_deadline() {
    let clock = RealClock::new();
    let gate = Arc::new(Gate::new());
    let deadline = clock.now() + Duration::from_millis(20);
    clock.park(&gate, deadline);
    // The gate never opened, so the deadline must have passed.
    assert!(clock.now() >= deadline);
}

#[test]
fn test_real_clock_park_wakes_on_open() {
    let clock = RealClock::new();
    let gate = Arc::new(Gate::new());
    let opener = {
        let gate = gate.clone();
        thread::spawn(move || gate.open())
    };
    clock.park(&gate, clock.now() + Duration::from_secs(60));
    assert!(gate.is_open());
    opener.join().unwrap();
}

#[test]
fn test_real_clock_park_past_deadline_returns() {
    let clock = RealClock::new();
    let gate = Arc::new(Gate::new());
    // A deadline in the past must not sleep.
    clock.park(&gate, TimePoint::ZERO);
    assert!(!gate.is_open());
}
