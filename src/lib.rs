//! # axiom-debounce ⏳
//!
//! A small, **thread-safe** crate providing a debounced-invocation primitive
//! and a family of sequential attempt helpers.
//!
//! The crate includes:
//!
//! - [`DebounceBuilder`] / [`debounce()`] — coalesce bursts of triggers into one
//!   delayed firing of a fixed set of callbacks, with terminal cancellation.
//! - [`Scheduler`] — the deferred-execution seam windows are armed on, with
//!   shared timer thread, thread-per-timer, Tokio, and manual-clock implementations.
//! - [`retry`] — call a fallible function until it succeeds, runs out of
//!   attempts, or asks to stop.
//!
//! ## ✨ Features
//!
//! - ✅ `Trigger` and `Cancel` handles are `Clone + Send + Sync`
//! - 🔒 One lock orders every state change; callbacks run outside it
//! - 🛑 Cancellation is idempotent and permanent
//! - 🧩 Pluggable [`Scheduler`] (a shared timer thread by default, per-timer OS
//!   threads, Tokio, or a virtual clock for tests)
//! - 📜 Structured logging through `tracing`
//!
//! ## 🚀 Quick Example
//!
//! ```rust
//! use axiom_debounce::{retry, DebounceBuilder};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! // Example 1: debouncing a burst of triggers
//! let flushes = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&flushes);
//! let (trigger, cancel) = DebounceBuilder::new(Duration::from_millis(20))
//!     .callback(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .build();
//!
//! for _ in 0..100 {
//!     trigger.trigger();
//! }
//! std::thread::sleep(Duration::from_millis(200));
//! assert_eq!(flushes.load(Ordering::SeqCst), 1);
//! cancel.cancel();
//!
//! // Example 2: retrying a flaky operation
//! let outcome = retry::attempt(3, |index| if index == 0 { Err("flaky") } else { Ok(()) });
//! assert_eq!(outcome.count, 2);
//! ```
//!
//! ## 🧠 Design
//!
//! ### Debouncer
//!
//! A debouncer holds its delay and callbacks immutably, and guards the pending
//! [`TimerHandle`] and a terminal flag with a single `parking_lot` mutex. Each
//! trigger schedules a new timer and only then stops the previous one; a cancel
//! stops the timer and sets the flag for good. The scheduled action shares only
//! the callback list, so there is no ownership cycle between the timer and the
//! debouncer, and a window that was armed fires even if every handle is dropped.
//!
//! ### Retry
//!
//! The attempt helpers are plain loops. Errors from the function are returned
//! as data in [`retry::Attempts`]; the only extra behaviour is counting, the
//! optional pause, and the early-exit signal.
//!
//! ## ⚠️ Usage Notes
//!
//! - Stopping a timer is **best-effort**: a firing that already started when a
//!   trigger or cancel lands still runs to completion.
//! - Callbacks must not assume exclusive access to anything the triggering
//!   threads also touch; coordinate through the callback's own state.
//! - A panicking callback is caught and logged, see [`PanicPolicy`].
//!
//! ## 📦 Modules
//!
//! - [`debounce`](mod@debounce) — the debouncer and its handles.
//! - [`scheduler`] — deferred execution and timer handles.
//! - [`retry`] — attempt helpers.
//!
//! ### Crate Exports
//!
//! - [`DebounceBuilder`], [`debounce()`], [`Trigger`], [`Cancel`],
//!   [`Callback`], [`PanicPolicy`] — from [`debounce`](mod@debounce)
//! - [`Scheduler`], [`TimerHandle`], [`TimerThreadScheduler`], [`ThreadScheduler`],
//!   [`TokioScheduler`], [`ManualScheduler`], [`ScheduleError`] — from [`scheduler`]
//! - [`attempt`], [`attempt_with_delay`], [`attempt_while`],
//!   [`attempt_while_with_delay`], [`MaxAttempts`] — from [`retry`]

pub mod debounce;
pub mod retry;
pub mod scheduler;

pub use debounce::{debounce, Callback, Cancel, DebounceBuilder, PanicPolicy, Trigger};
pub use retry::{
    attempt, attempt_while, attempt_while_with_delay, attempt_with_delay, Attempts, MaxAttempts,
    RetryError,
};
pub use scheduler::{
    ManualScheduler, ScheduleError, Scheduler, ThreadScheduler, TimerHandle, TimerThreadScheduler,
    TokioScheduler,
};
