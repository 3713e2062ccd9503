//! flowtask - cooperative task engine and synchronization primitives
//!
//! A caller obtains a [`Runner`], schedules work to get a [`Task`], chains
//! follow-up work (possibly destined for other runners), and later blocks on
//! a task or a combinator to observe its outcome. Beneath the engine sit a
//! [`Mutex`] with acquire/try-acquire/timeout semantics and a [`Condition`]
//! bound to it, both driven by a pluggable [`Clock`] so timeout behavior is
//! deterministically testable without wall-clock delay.
//!
//! # Example
//!
//! ```rust
//! use flowtask::Runner;
//!
//! let runner = Runner::manual();
//! let task = runner.compute(|| Ok(21 * 2));
//! runner.drain();
//! assert_eq!(task.wait_value().unwrap(), 42);
//! ```

#![doc(html_root_url = "https://docs.rs/flowtask")]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod runner;
pub mod sync;
pub mod task;
pub mod time;

// Utility modules
pub mod util;

// Re-exports
pub use error::{JoinError, LockError, TaskError};
pub use runner::{registry, Runner, RunnerConfig};
pub use sync::{Condition, Gate, Mutex};
pub use task::{Task, TaskHandle, TaskState};
pub use time::{Clock, ManualClock, RealClock, TimePoint};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
