//! Gate unit tests

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::sync::Gate;

#[test]
fn test_gate_starts_closed() {
    let gate = Gate::new();
    assert!(!gate.is_open());
}

#[test]
fn test_gate_open_is_sticky() {
    let gate = Gate::new();
    gate.open();
    assert!(gate.is_open());
    gate.open();
    assert!(gate.is_open());
    // Waiting on an open gate returns immediately.
    gate.wait();
}

#[test]
fn test_gate_wait_for_times_out() {
    let gate = Gate::new();
    assert!(!gate.wait_for(Duration::from_millis(10)));
}

#[test]
fn test_gate_wait_for_open_gate() {
    let gate = Gate::new();
    gate.open();
    assert!(gate.wait_for(Duration::from_millis(10)));
}

#[test]
fn test_gate_releases_waiting_thread() {
    let gate = Arc::new(Gate::new());
    let waiter = {
        let gate = gate.clone();
        thread::spawn(move || {
            gate.wait();
            true
        })
    };
    thread::sleep(Duration::from_millis(10));
    gate.open();
    assert!(waiter.join().unwrap());
}

#[test]
fn test_gate_open_before_wait_is_not_lost() {
    let gate = Arc::new(Gate::new());
    gate.open();
    let waiter = {
        let gate = gate.clone();
        thread::spawn(move || {
            gate.wait();
        })
    };
    waiter.join().unwrap();
}
