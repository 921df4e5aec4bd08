//! # Debounce
//!
//! A thread-safe debounced-invocation primitive. Any number of callers may
//! [`Trigger::trigger`] an instance; each trigger (re)arms a single delay
//! window, and only when a window elapses without being re-armed do the
//! registered callbacks run, once, in registration order. [`Cancel::cancel`]
//! disarms the instance for good.
//!
//! ## Example
//! ```rust
//! use axiom_debounce::DebounceBuilder;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let saves = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&saves);
//!
//! let (trigger, cancel) = DebounceBuilder::new(Duration::from_millis(20))
//!     .callback(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .build();
//!
//! for _ in 0..10 {
//!     trigger.trigger();
//! }
//!
//! std::thread::sleep(Duration::from_millis(200));
//! assert_eq!(saves.load(Ordering::SeqCst), 1);
//!
//! cancel.cancel();
//! trigger.trigger(); // no-op from here on
//! ```
//!
//! ## Races
//! Stopping a timer is best-effort. A firing that has already begun when a
//! [`Trigger::trigger`] or [`Cancel::cancel`] lands is not retracted and runs to
//! completion, so at most one extra firing can slip through such a race.
//! Callbacks run without the instance's lock held.
//!
//! A pending window outlives the handles: dropping every [`Trigger`] and
//! [`Cancel`] detaches the timer, and it still fires. Only a cancel or a
//! re-arm stops it.
//!
//! ## Panics in callbacks
//! Each callback runs under [`catch_unwind`](std::panic::catch_unwind). A panic
//! is logged and never reaches the scheduler; the [`PanicPolicy`] decides
//! whether the rest of that firing still runs.

use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::scheduler::{Scheduler, TimerHandle, TimerThreadScheduler};

/// Label used in log events when none is configured.
const DEFAULT_LABEL: &str = "debounce";

/// A callback invoked when a debounce window elapses.
pub type Callback = Box<dyn Fn() + Send + Sync + 'static>;

/// What a firing does after one of its callbacks panics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanicPolicy {
    /// Log the panic and run the remaining callbacks.
    #[default]
    Continue,
    /// Log the panic and skip the remaining callbacks of this firing.
    SkipRemaining,
}

#[derive(Debug, Default)]
struct State {
    pending: Option<TimerHandle>,
    terminated: bool,
}

struct Debouncer {
    delay: Duration,
    callbacks: Arc<[Callback]>,
    scheduler: Box<dyn Scheduler>,
    panic_policy: PanicPolicy,
    label: Arc<str>,
    state: Mutex<State>,
}

impl Debouncer {
    fn reset(&self) {
        let mut state = self.state.lock();

        if state.terminated {
            trace!(label = %self.label, "trigger ignored, debouncer cancelled");
            return;
        }

        let firing = Firing {
            callbacks: Arc::clone(&self.callbacks),
            panic_policy: self.panic_policy,
            label: Arc::clone(&self.label),
        };

        // The previous window is only stopped once its replacement is armed.
        match self.scheduler.schedule(self.delay, Box::new(move || firing.run())) {
            Ok(timer) => match state.pending.replace(timer) {
                Some(previous) => {
                    previous.stop();
                    trace!(label = %self.label, "debounce window re-armed");
                }
                None => debug!(label = %self.label, delay = ?self.delay, "debounce window armed"),
            },
            Err(err) => warn!(
                label = %self.label,
                error = %err,
                kept_previous = state.pending.is_some(),
                "failed to arm debounce window"
            ),
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();

        if let Some(timer) = state.pending.take() {
            timer.stop();
        }

        if !state.terminated {
            debug!(label = %self.label, "debouncer cancelled");
        }
        state.terminated = true;
    }

    fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    fn has_timer(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Debouncer");
        out
            .field("label", &self.label)
            .field("delay", &self.delay)
            .field("callbacks", &self.callbacks.len())
            .field("panic_policy", &self.panic_policy);
        match self.state.try_lock() {
            Some(state) => out.field("state", &*state),
            None => out.field("state", &"<locked>"),
        };
        out.finish_non_exhaustive()
    }
}

/// The action a scheduled timer runs. Holds only immutable data, never the
/// debouncer itself.
struct Firing {
    callbacks: Arc<[Callback]>,
    panic_policy: PanicPolicy,
    label: Arc<str>,
}

impl Firing {
    fn run(&self) {
        debug!(label = %self.label, callbacks = self.callbacks.len(), "debounce window elapsed");

        for (index, callback) in self.callbacks.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                error!(
                    label = %self.label,
                    index,
                    panic = %panic_message(payload.as_ref()),
                    "debounced callback panicked"
                );
                if self.panic_policy == PanicPolicy::SkipRemaining {
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Arms or re-arms the debounce window. Cloneable and shareable across threads.
#[derive(Clone)]
pub struct Trigger {
    debouncer: Arc<Debouncer>,
}

impl Trigger {
    /// Starts the delay window from now, replacing any window already armed.
    ///
    /// Does nothing once the paired [`Cancel`] has been used.
    pub fn trigger(&self) {
        self.debouncer.reset();
    }

    /// Whether the instance has been cancelled.
    pub fn is_terminated(&self) -> bool {
        self.debouncer.is_terminated()
    }

    /// Whether a timer handle is currently recorded.
    ///
    /// This is not "a firing is still to come": the handle of a window that
    /// already fired stays recorded until the next trigger or cancel replaces it.
    pub fn has_timer(&self) -> bool {
        self.debouncer.has_timer()
    }

    /// The configured window length.
    pub fn delay(&self) -> Duration {
        self.debouncer.delay
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Trigger").field(&self.debouncer).finish()
    }
}

/// Terminally disarms the debouncer. Idempotent.
#[derive(Clone)]
pub struct Cancel {
    debouncer: Arc<Debouncer>,
}

impl Cancel {
    /// Stops any pending window and makes every later trigger a no-op.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    /// Whether the instance has been cancelled.
    pub fn is_terminated(&self) -> bool {
        self.debouncer.is_terminated()
    }

    /// The configured window length.
    pub fn delay(&self) -> Duration {
        self.debouncer.delay
    }
}

impl fmt::Debug for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cancel").field(&self.debouncer).finish()
    }
}

/// Configures and builds a debouncer.
///
/// # Example
/// ```
/// use axiom_debounce::{DebounceBuilder, PanicPolicy};
/// use axiom_debounce::scheduler::ManualScheduler;
/// use std::time::Duration;
///
/// let clock = ManualScheduler::new();
/// let (trigger, _cancel) = DebounceBuilder::new(Duration::from_millis(10))
///     .label("autosave")
///     .panic_policy(PanicPolicy::SkipRemaining)
///     .scheduler(clock.clone())
///     .callback(|| println!("saved"))
///     .build();
///
/// trigger.trigger();
/// assert_eq!(clock.advance(Duration::from_millis(10)), 1);
/// ```
pub struct DebounceBuilder {
    delay: Duration,
    callbacks: Vec<Callback>,
    scheduler: Option<Box<dyn Scheduler>>,
    panic_policy: PanicPolicy,
    label: Option<String>,
}

impl DebounceBuilder {
    /// Starts a builder for windows of length `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            callbacks: Vec::new(),
            scheduler: None,
            panic_policy: PanicPolicy::default(),
            label: None,
        }
    }

    /// Appends a callback; callbacks run in the order they were added.
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(f));
        self
    }

    /// Appends already boxed callbacks, preserving their order.
    pub fn callbacks(mut self, callbacks: impl IntoIterator<Item = Callback>) -> Self {
        self.callbacks.extend(callbacks);
        self
    }

    /// Arms windows on `scheduler` instead of a fresh [`TimerThreadScheduler`].
    pub fn scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: Scheduler + 'static,
    {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Sets how a firing reacts to a panicking callback.
    pub fn panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

    /// Names the instance in log events.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builds the debouncer and returns its two entry points.
    pub fn build(self) -> (Trigger, Cancel) {
        let label: Arc<str> = self.label.as_deref().unwrap_or(DEFAULT_LABEL).into();
        let debouncer = Arc::new(Debouncer {
            delay: self.delay,
            callbacks: self.callbacks.into(),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Box::new(TimerThreadScheduler::new())),
            panic_policy: self.panic_policy,
            label,
            state: Mutex::new(State::default()),
        });

        (
            Trigger {
                debouncer: Arc::clone(&debouncer),
            },
            Cancel { debouncer },
        )
    }
}

impl fmt::Debug for DebounceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceBuilder")
            .field("delay", &self.delay)
            .field("callbacks", &self.callbacks.len())
            .field("custom_scheduler", &self.scheduler.is_some())
            .field("panic_policy", &self.panic_policy)
            .field("label", &self.label)
            .finish()
    }
}

/// Creates a debouncer that runs `callbacks`, in order, `delay` after the last
/// trigger, on a [`TimerThreadScheduler`] of its own.
///
/// An empty callback list is allowed; its firings do nothing.
pub fn debounce(delay: Duration, callbacks: Vec<Callback>) -> (Trigger, Cancel) {
    DebounceBuilder::new(delay).callbacks(callbacks).build()
}
