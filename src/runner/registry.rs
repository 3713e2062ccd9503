//! Dynamically scoped "current runner" registry.
//!
//! Code without an explicit [`Runner`] reference can discover the runner
//! executing the current call through [`current`]. The binding is strictly
//! scoped to the dynamic extent of one callback: [`enter`] pushes on entry
//! and a drop guard pops on exit, including on panic, so unrelated call
//! stacks never observe a stale binding.

use std::cell::RefCell;

use super::Runner;

thread_local! {
    static CURRENT: RefCell<Vec<Runner>> = const { RefCell::new(Vec::new()) };
}

struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `runner` bound as the current runner for this thread.
///
/// Nesting is allowed; the previous binding is restored when `f` returns or
/// unwinds.
pub fn enter<R>(
    runner: &Runner,
    f: impl FnOnce() -> R,
) -> R {
    CURRENT.with(|stack| stack.borrow_mut().push(runner.clone()));
    let _guard = PopGuard;
    f()
}

/// The runner currently executing this call, if any.
pub fn current() -> Option<Runner> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}
