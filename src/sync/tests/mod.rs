//! Synchronization primitive unit tests

mod gate;
