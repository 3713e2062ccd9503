//! Queue representations, one per dispatch policy.
//!
//! Manual and current-thread runners pump a locked deque on the caller's
//! thread; parallel runners hand units to a worker pool through a crossbeam
//! channel. Completion and continuation-transfer logic upstream is written
//! once against [`Runner`](super::Runner) and never sees the difference.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::sync::Gate;
use crate::task::cell::Unit;

/// Caller-pumped FIFO queue for manual and current-thread runners.
#[derive(Debug)]
pub(crate) struct LocalQueue {
    inner: Mutex<LocalInner>,
}

#[derive(Debug)]
struct LocalInner {
    units: VecDeque<Unit>,
    /// Gates opened on the next push; used by pumping waits to sleep until
    /// either new work arrives or the awaited task completes.
    waiters: Vec<Arc<Gate>>,
}

impl LocalQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(LocalInner {
                units: VecDeque::new(),
                waiters: Vec::new(),
            }),
        }
    }

    pub(crate) fn push(
        &self,
        unit: Unit,
    ) {
        let mut inner = self.inner.lock();
        inner.units.push_back(unit);
        for gate in inner.waiters.drain(..) {
            gate.open();
        }
    }

    pub(crate) fn pop(&self) -> Option<Unit> {
        self.inner.lock().units.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().units.len()
    }

    /// Abandon all queued units. Returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.units.len();
        inner.units.clear();
        dropped
    }

    /// Open `gate` on the next push; immediately if work is already queued.
    pub(crate) fn subscribe(
        &self,
        gate: &Arc<Gate>,
    ) {
        let mut inner = self.inner.lock();
        if inner.units.is_empty() {
            inner.waiters.push(gate.clone());
        } else {
            gate.open();
        }
    }
}

/// Channel-backed queue drained continuously by a worker pool.
#[derive(Debug)]
pub(crate) struct PoolQueue {
    tx: Mutex<Option<Sender<Unit>>>,
    rx: Receiver<Unit>,
}

impl PoolQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Receiver handle for a worker thread.
    pub(crate) fn receiver(&self) -> Receiver<Unit> {
        self.rx.clone()
    }

    /// Hand a unit to the pool. Returns false once the queue is closed.
    pub(crate) fn push(
        &self,
        unit: Unit,
    ) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(unit).is_ok(),
            None => false,
        }
    }

    /// Stop intake; workers drain out once the channel disconnects.
    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }

    /// Drop whatever intake left behind. Returns how many were abandoned.
    pub(crate) fn drain_remaining(&self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// The per-policy queue behind one runner.
#[derive(Debug)]
pub(crate) enum WorkQueue {
    Local(LocalQueue),
    Pool(PoolQueue),
}
