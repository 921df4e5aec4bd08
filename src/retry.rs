//! # Retry
//!
//! Sequential attempt helpers: call a fallible function with an increasing
//! index until it succeeds, the attempt budget runs out, or the function asks
//! to stop.
//!
//! Errors returned by the function are data. They are handed back in
//! [`Attempts`], never retried on their own or recovered from.
//!
//! ## Features
//! - ✅ **Bounded or unbounded** budgets via [`MaxAttempts`]
//! - ⏱️ **Fixed pause** between unsuccessful attempts, never after the last one
//! - 🛑 **Early exit** signal for the `*_while` variants
//! - 📏 **Elapsed time** passed to the function and reported in the outcome
//!
//! ## Example
//! ```rust
//! use axiom_debounce::retry::attempt;
//!
//! let outcome = attempt(5, |index| if index < 2 { Err("busy") } else { Ok(()) });
//!
//! assert_eq!(outcome.count, 3);
//! assert!(outcome.is_success());
//! ```
//!
//! ## Budgets
//! Any integer converts into a [`MaxAttempts`]. Zero or a negative value means
//! [`MaxAttempts::Unbounded`]: the function is called until it succeeds or asks
//! to stop.

use core::num::NonZeroUsize;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

/// How many times a helper may call its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    /// At most this many calls.
    Bounded(NonZeroUsize),
    /// Calls until success or an early-exit signal.
    Unbounded,
}

impl MaxAttempts {
    /// Budget with no upper bound.
    pub const fn unbounded() -> Self {
        MaxAttempts::Unbounded
    }

    /// The maximum number of calls, if bounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            MaxAttempts::Bounded(n) => Some(n.get()),
            MaxAttempts::Unbounded => None,
        }
    }

    #[inline]
    fn allows(self, index: usize) -> bool {
        match self {
            MaxAttempts::Bounded(n) => index < n.get(),
            MaxAttempts::Unbounded => true,
        }
    }

    #[inline]
    fn is_last(self, index: usize) -> bool {
        match self {
            MaxAttempts::Bounded(n) => index + 1 >= n.get(),
            MaxAttempts::Unbounded => false,
        }
    }
}

impl From<NonZeroUsize> for MaxAttempts {
    fn from(n: NonZeroUsize) -> Self {
        MaxAttempts::Bounded(n)
    }
}

macro_rules! max_attempts_from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for MaxAttempts {
            fn from(n: $t) -> Self {
                usize::try_from(n)
                    .ok()
                    .and_then(NonZeroUsize::new)
                    .map_or(MaxAttempts::Unbounded, MaxAttempts::Bounded)
            }
        }
    )*};
}

macro_rules! max_attempts_from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for MaxAttempts {
            fn from(n: $t) -> Self {
                if n <= 0 {
                    return MaxAttempts::Unbounded;
                }
                usize::try_from(n)
                    .ok()
                    .and_then(NonZeroUsize::new)
                    .map_or(MaxAttempts::Unbounded, MaxAttempts::Bounded)
            }
        }
    )*};
}

max_attempts_from_unsigned!(u8, u16, u32, u64, usize);
max_attempts_from_signed!(i8, i16, i32, i64, isize);

/// Outcome of an attempt helper.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Attempts<E> {
    /// Number of times the function was called.
    pub count: usize,
    /// Time from the first call to the return of the helper.
    pub elapsed: Duration,
    /// The last error, or `None` on success.
    pub error: Option<E>,
    /// Whether the function asked to stop.
    pub stopped: bool,
}

impl<E> Attempts<E> {
    /// Whether the last call succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into the attempt count on success, or a [`RetryError`].
    pub fn into_result(self) -> Result<usize, RetryError<E>> {
        match self.error {
            None => Ok(self.count),
            Some(source) if self.stopped => Err(RetryError::Stopped {
                attempts: self.count,
                source,
            }),
            Some(source) => Err(RetryError::Exhausted {
                attempts: self.count,
                source,
            }),
        }
    }
}

/// Why an attempt helper gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The budget ran out; `source` is the error from the final call.
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: usize,
        #[source]
        source: E,
    },

    /// The function asked to stop while returning `source`.
    #[error("stopped after {attempts} attempts")]
    Stopped {
        attempts: usize,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of calls made before giving up.
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Stopped { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The error from the final call.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Stopped { source, .. } => source,
        }
    }
}

fn run<E, F>(max: MaxAttempts, delay: Option<Duration>, mut f: F) -> Attempts<E>
where
    F: FnMut(usize, Duration) -> (Result<(), E>, bool),
{
    let start = Instant::now();
    let mut last_error = None;
    let mut index = 0usize;

    while max.allows(index) {
        let (result, keep_going) = f(index, start.elapsed());
        let count = index + 1;

        let err = match result {
            Ok(()) => {
                trace!(attempt = count, "attempt succeeded");
                return Attempts {
                    count,
                    elapsed: start.elapsed(),
                    error: None,
                    stopped: !keep_going,
                };
            }
            Err(err) => err,
        };

        if !keep_going {
            debug!(attempt = count, "attempt failed, stop requested");
            return Attempts {
                count,
                elapsed: start.elapsed(),
                error: Some(err),
                stopped: true,
            };
        }

        last_error = Some(err);

        match delay {
            Some(delay) if !max.is_last(index) => {
                debug!(attempt = count, ?delay, "attempt failed, retrying after delay");
                thread::sleep(delay);
            }
            _ => debug!(attempt = count, "attempt failed"),
        }

        index = index.saturating_add(1);
    }

    Attempts {
        count: index,
        elapsed: start.elapsed(),
        error: last_error,
        stopped: false,
    }
}

/// Calls `f(index)` until it returns `Ok` or `max` calls have been made.
///
/// # Examples
/// ```
/// use axiom_debounce::retry::attempt;
///
/// let outcome = attempt(2, |index| Err::<(), _>(index));
/// assert_eq!(outcome.count, 2);
/// assert_eq!(outcome.error, Some(1));
/// ```
pub fn attempt<E, F>(max: impl Into<MaxAttempts>, mut f: F) -> Attempts<E>
where
    F: FnMut(usize) -> Result<(), E>,
{
    run(max.into(), None, |index, _| (f(index), true))
}

/// Like [`attempt`], sleeping `delay` after every unsuccessful call except the
/// last one allowed by the budget.
///
/// `f` also receives the time elapsed since the first call.
pub fn attempt_with_delay<E, F>(max: impl Into<MaxAttempts>, delay: Duration, mut f: F) -> Attempts<E>
where
    F: FnMut(usize, Duration) -> Result<(), E>,
{
    run(max.into(), Some(delay), |index, elapsed| (f(index, elapsed), true))
}

/// Like [`attempt`], but `f` also returns whether to keep going.
///
/// Returning `false` ends the loop at once with whatever result `f` produced,
/// regardless of the budget.
///
/// # Examples
/// ```
/// use axiom_debounce::retry::attempt_while;
///
/// let outcome = attempt_while(10, |_| (Err::<(), _>("fatal"), false));
/// assert_eq!(outcome.count, 1);
/// assert!(outcome.stopped);
/// ```
pub fn attempt_while<E, F>(max: impl Into<MaxAttempts>, mut f: F) -> Attempts<E>
where
    F: FnMut(usize) -> (Result<(), E>, bool),
{
    run(max.into(), None, |index, _| f(index))
}

/// [`attempt_while`] with the pause of [`attempt_with_delay`].
pub fn attempt_while_with_delay<E, F>(
    max: impl Into<MaxAttempts>,
    delay: Duration,
    f: F,
) -> Attempts<E>
where
    F: FnMut(usize, Duration) -> (Result<(), E>, bool),
{
    run(max.into(), Some(delay), f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("boom at {0}")]
    struct Boom(usize);

    fn fail_until(success_at: usize) -> impl FnMut(usize) -> Result<(), Boom> {
        move |index| if index < success_at { Err(Boom(index)) } else { Ok(()) }
    }

    /// Succeeds on the third call within a budget of three.
    #[test]
    fn test_attempt_succeeds_within_budget() {
        let outcome = attempt(3, fail_until(2));
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.into_result().unwrap(), 3);
    }

    /// Runs out of budget and reports the error from the last call.
    #[test]
    fn test_attempt_exhausted() {
        let outcome = attempt(2, fail_until(2));
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.error, Some(Boom(1)));
        assert!(!outcome.stopped);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 2, .. }));
        assert_eq!(err.to_string(), "gave up after 2 attempts");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("boom at 1"));
        assert_eq!(err.into_inner(), Boom(1));
    }

    #[test]
    fn test_attempt_unbounded_runs_until_success() {
        for budget in [MaxAttempts::from(0usize), MaxAttempts::from(-1i32), MaxAttempts::unbounded()] {
            let outcome = attempt(budget, fail_until(50));
            assert_eq!(outcome.count, 51);
            assert!(outcome.is_success());
        }
    }

    /// An early-exit signal wins over the remaining budget.
    #[test]
    fn test_attempt_while_stops_immediately() {
        let mut calls = 0;
        let outcome = attempt_while(10, |index| {
            calls += 1;
            (Err(Boom(index)), false)
        });

        assert_eq!(calls, 1);
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.error, Some(Boom(0)));
        assert!(outcome.stopped);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, RetryError::Stopped { attempts: 1, .. }));
        assert_eq!(err.attempts(), 1);
    }

    #[test]
    fn test_attempt_while_stop_without_error_is_success() {
        let outcome = attempt_while(0, |index| {
            if index < 20 {
                (Err(Boom(index)), true)
            } else {
                (Ok(()), false)
            }
        });

        assert_eq!(outcome.count, 21);
        assert!(outcome.is_success());
        assert_eq!(outcome.into_result().unwrap(), 21);
    }

    /// The pause falls between attempts, and elapsed time only grows.
    #[test]
    fn test_attempt_with_delay_sleeps_between_attempts() {
        let delay = Duration::from_millis(10);
        let mut seen = Vec::new();
        let outcome = attempt_with_delay(3, delay, |index, elapsed| {
            seen.push(elapsed);
            Err(Boom(index))
        });

        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.error, Some(Boom(2)));
        assert_eq!(seen.len(), 3);
        for pair in seen.windows(2) {
            assert!(pair[1] >= pair[0] + delay, "Missing pause between attempts");
        }
        assert!(outcome.elapsed >= seen[2]);
    }

    /// No pause follows the final attempt of a bounded budget, nor a success.
    #[test]
    fn test_attempt_with_delay_no_sleep_after_final() {
        let long = Duration::from_secs(30);

        let failed = attempt_with_delay(1, long, |index, _| Err(Boom(index)));
        assert_eq!(failed.count, 1);
        assert!(failed.elapsed < long, "Slept after the final attempt");

        let succeeded = attempt_with_delay(5, long, |_, _| Ok::<(), Boom>(()));
        assert_eq!(succeeded.count, 1);
        assert!(succeeded.elapsed < long, "Slept after success");
    }

    #[test]
    fn test_attempt_while_with_delay() {
        let delay = Duration::from_millis(5);
        let outcome = attempt_while_with_delay(-3i64, delay, |index, _| {
            (Err(Boom(index)), index < 3)
        });

        assert_eq!(outcome.count, 4);
        assert_eq!(outcome.error, Some(Boom(3)));
        assert!(outcome.stopped);
        assert!(outcome.elapsed >= delay * 3);
    }

    #[test]
    fn test_max_attempts_conversions() {
        assert_eq!(MaxAttempts::from(3u32).limit(), Some(3));
        assert_eq!(MaxAttempts::from(7i64).limit(), Some(7));
        assert_eq!(MaxAttempts::from(0u8), MaxAttempts::Unbounded);
        assert_eq!(MaxAttempts::from(-5isize), MaxAttempts::Unbounded);
        assert!(MaxAttempts::from(2usize).is_last(1));
        assert!(!MaxAttempts::Unbounded.is_last(usize::MAX - 1));
    }
}
