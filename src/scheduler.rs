//! # Scheduler
//!
//! The deferred-execution facility a [`Debouncer`](crate::debounce) arms its
//! windows on. A [`Scheduler`] runs a zero-argument action once, after a delay,
//! without blocking the caller, and hands back a [`TimerHandle`] that can stop
//! the action before it starts.
//!
//! Stopping is **best-effort**: once an action has begun running, stopping its
//! handle does not retract it. Dropping a handle without stopping it detaches
//! the timer, which still fires.
//!
//! ## Implementations
//! - [`TimerThreadScheduler`] — one long-lived thread per scheduler draining a
//!   deadline queue fed over a `crossbeam-channel`.
//! - [`ThreadScheduler`] — one short-lived OS thread per armed timer, parked on a
//!   `crossbeam-channel` receiver until the delay elapses or a stop arrives.
//! - [`TokioScheduler`] — a sleeping task on a Tokio runtime, aborted on stop.
//! - [`ManualScheduler`] — a virtual clock driven by [`ManualScheduler::advance`],
//!   for deterministic tests.
//!
//! ## Example
//! ```rust
//! use axiom_debounce::scheduler::{ManualScheduler, Scheduler};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = ManualScheduler::new();
//! let ran = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&ran);
//!
//! let _timer = clock
//!     .schedule(Duration::from_millis(50), Box::new(move || flag.store(true, Ordering::SeqCst)))
//!     .unwrap();
//!
//! clock.advance(Duration::from_millis(49));
//! assert!(!ran.load(Ordering::SeqCst));
//! clock.advance(Duration::from_millis(1));
//! assert!(ran.load(Ordering::SeqCst));
//! ```

use core::fmt;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace};

/// Default name given to timer threads.
const TIMER_THREAD_NAME: &str = "axiom-debounce-timer";

/// A one-shot action run by a [`Scheduler`] once its delay elapses.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while arming a timer.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The OS refused to start a timer thread.
    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),

    /// The timer thread hung up before accepting the timer.
    #[error("timer thread is no longer running")]
    TimerThreadGone,

    /// No Tokio runtime is reachable from the calling thread.
    #[error("no Tokio runtime available to schedule on")]
    NoRuntime,
}

/// Runs an [`Action`] once after a delay, off the caller's stack.
pub trait Scheduler: Send + Sync {
    /// Arms a one-shot timer that runs `action` after `delay`.
    ///
    /// Must return without waiting for the delay.
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError>;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError> {
        (**self).schedule(delay, action)
    }
}

enum StopSignal {
    Channel(Sender<()>),
    Shared(Sender<Command>, u64),
    Task(AbortHandle),
    Flag(Arc<AtomicBool>),
    Custom(Box<dyn FnOnce() + Send + 'static>),
}

/// Exclusively owned handle to an armed timer.
///
/// [`stop`](TimerHandle::stop) prevents the action from running unless it has
/// already started. Dropping the handle without stopping it detaches the timer,
/// which still fires on schedule.
#[must_use = "dropping a TimerHandle detaches its timer; call `stop` to disarm it"]
pub struct TimerHandle {
    stop: Option<StopSignal>,
}

impl TimerHandle {
    /// Builds a handle for a custom [`Scheduler`] whose stop is `f`.
    ///
    /// `f` runs at most once, on [`stop`](TimerHandle::stop). It is discarded
    /// unrun if the handle is dropped.
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Self::with(StopSignal::Custom(Box::new(f)))
    }

    fn with(signal: StopSignal) -> Self {
        Self { stop: Some(signal) }
    }

    /// Stops the timer. Best-effort.
    pub fn stop(mut self) {
        match self.stop.take() {
            Some(StopSignal::Channel(sender)) => {
                let _ = sender.try_send(());
            }
            Some(StopSignal::Shared(sender, id)) => {
                let _ = sender.send(Command::Stop { id });
            }
            Some(StopSignal::Task(task)) => task.abort(),
            Some(StopSignal::Flag(stopped)) => stopped.store(true, Ordering::Release),
            Some(StopSignal::Custom(f)) => f(),
            None => {}
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.stop {
            Some(StopSignal::Channel(_)) => "thread",
            Some(StopSignal::Shared(..)) => "timer-thread",
            Some(StopSignal::Task(_)) => "tokio",
            Some(StopSignal::Flag(_)) => "manual",
            Some(StopSignal::Custom(_)) => "custom",
            None => "stopped",
        };
        f.debug_struct("TimerHandle").field("kind", &kind).finish()
    }
}

fn run_action(action: Action) {
    if panic::catch_unwind(AssertUnwindSafe(action)).is_err() {
        error!("scheduled action panicked");
    }
}

enum Command {
    Arm {
        id: u64,
        deadline: Instant,
        action: Action,
    },
    Stop {
        id: u64,
    },
}

struct TimerThread {
    thread_name: String,
    next_id: AtomicU64,
    sender: Mutex<Option<Sender<Command>>>,
}

/// Runs every timer on one long-lived thread.
///
/// The thread is spawned on the first [`schedule`](Scheduler::schedule) and
/// keeps a deadline-ordered queue fed through a `crossbeam-channel`. Arming
/// and stopping are channel sends, so neither blocks nor spawns. Actions run
/// one after another on that thread; a slow action delays the ones behind it.
///
/// The thread exits once the scheduler and every handle are gone and its
/// queue has drained. Clones share the same thread.
#[derive(Clone)]
pub struct TimerThreadScheduler {
    inner: Arc<TimerThread>,
}

impl TimerThreadScheduler {
    /// Creates a scheduler whose thread uses the default name.
    pub fn new() -> Self {
        Self::named(TIMER_THREAD_NAME)
    }

    /// Creates a scheduler whose thread is called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TimerThread {
                thread_name: name.into(),
                next_id: AtomicU64::new(0),
                sender: Mutex::new(None),
            }),
        }
    }

    fn spawn_thread(&self) -> Result<Sender<Command>, ScheduleError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        thread::Builder::new()
            .name(self.inner.thread_name.clone())
            .spawn(move || timer_loop(receiver))?;
        debug!(name = %self.inner.thread_name, "timer thread started");
        Ok(sender)
    }
}

impl Default for TimerThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerThreadScheduler")
            .field("thread_name", &self.inner.thread_name)
            .field("running", &self.inner.sender.lock().is_some())
            .finish()
    }
}

impl Scheduler for TimerThreadScheduler {
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let Some(deadline) = Instant::now().checked_add(delay) else {
            // Beyond the clock's range: the timer can never come due.
            return Ok(TimerHandle::from_fn(|| {}));
        };

        let mut slot = self.inner.sender.lock();
        let mut command = Command::Arm {
            id,
            deadline,
            action,
        };

        if let Some(sender) = slot.as_ref() {
            match sender.send(command) {
                Ok(()) => return Ok(TimerHandle::with(StopSignal::Shared(sender.clone(), id))),
                Err(returned) => command = returned.into_inner(),
            }
        }

        let sender = self.spawn_thread()?;
        sender
            .send(command)
            .map_err(|_| ScheduleError::TimerThreadGone)?;
        *slot = Some(sender.clone());
        Ok(TimerHandle::with(StopSignal::Shared(sender, id)))
    }
}

fn timer_loop(receiver: Receiver<Command>) {
    let mut queue: BTreeMap<(Instant, u64), Action> = BTreeMap::new();
    let mut deadlines: HashMap<u64, Instant> = HashMap::new();
    let mut connected = true;

    loop {
        let now = Instant::now();
        while let Some(entry) = queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, id), action) = entry.remove_entry();
            deadlines.remove(&id);
            run_action(action);
        }

        let next = queue.keys().next().map(|(deadline, _)| *deadline);
        let received = match (connected, next) {
            (true, Some(deadline)) => receiver.recv_deadline(deadline),
            (true, None) => receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
            (false, Some(deadline)) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                continue;
            }
            (false, None) => break,
        };

        match received {
            Ok(Command::Arm {
                id,
                deadline,
                action,
            }) => {
                deadlines.insert(id, deadline);
                queue.insert((deadline, id), action);
            }
            Ok(Command::Stop { id }) => {
                if let Some(deadline) = deadlines.remove(&id) {
                    queue.remove(&(deadline, id));
                    trace!(id, "timer stopped before expiry");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => connected = false,
        }
    }

    trace!("timer thread exiting");
}

/// Arms each timer on its own OS thread.
///
/// The thread blocks on a channel with a timeout equal to the delay; a stop
/// signal ends it without running the action, a timeout runs the action on
/// that thread. Every arm spawns a thread, so under frequent re-arming
/// [`TimerThreadScheduler`] is the cheaper choice.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    thread_name: String,
}

impl ThreadScheduler {
    /// Creates a scheduler whose timer threads use the default name.
    pub fn new() -> Self {
        Self::named(TIMER_THREAD_NAME)
    }

    /// Creates a scheduler whose timer threads are called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let deadline = Instant::now().checked_add(delay);

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || match stop_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => run_action(action),
                Ok(()) => trace!(?delay, "timer stopped before expiry"),
                // Handle dropped without a stop: wait out the rest of the delay.
                Err(RecvTimeoutError::Disconnected) => {
                    if let Some(deadline) = deadline {
                        thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        run_action(action);
                    }
                }
            })?;

        Ok(TimerHandle::with(StopSignal::Channel(stop_tx)))
    }
}

/// Arms timers as sleeping tasks on a Tokio runtime.
///
/// The action runs on a runtime worker once the sleep completes, so it should
/// not block for long. Stopping aborts the task; an action already running is
/// synchronous and finishes regardless.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedules on the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules on the runtime the caller is currently inside.
    pub fn current() -> Result<Self, ScheduleError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| ScheduleError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        Ok(TimerHandle::with(StopSignal::Task(task.abort_handle())))
    }
}

struct ManualTimer {
    deadline: Duration,
    seq: u64,
    stopped: Arc<AtomicBool>,
    action: Action,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    timers: Vec<ManualTimer>,
}

/// Scheduler driven by a virtual clock.
///
/// Nothing fires until [`advance`](ManualScheduler::advance) moves the clock
/// past a deadline. Clones share the same clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    /// Creates a scheduler with its clock at zero and no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of armed timers that have neither fired nor been stopped.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .timers
            .iter()
            .filter(|timer| !timer.stopped.load(Ordering::Acquire))
            .count()
    }

    /// Moves the clock forward by `by`, running every due action in deadline
    /// order on the calling thread. Returns how many actions ran.
    ///
    /// Actions run without the clock locked, so they may schedule more timers;
    /// those fire in the same call if they fall due before the target time.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let clock = self.clock.lock();
            clock.now.saturating_add(by)
        };

        let mut fired = 0;
        while let Some(timer) = self.next_due(target) {
            (timer.action)();
            fired += 1;
        }
        fired
    }

    fn next_due(&self, target: Duration) -> Option<ManualTimer> {
        let mut clock = self.clock.lock();
        clock
            .timers
            .retain(|timer| !timer.stopped.load(Ordering::Acquire));

        let next = clock
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= target)
            .min_by_key(|(_, timer)| (timer.deadline, timer.seq))
            .map(|(index, _)| index);

        match next {
            Some(index) => {
                let timer = clock.timers.swap_remove(index);
                clock.now = clock.now.max(timer.deadline);
                Some(timer)
            }
            None => {
                clock.now = target;
                None
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: Action) -> Result<TimerHandle, ScheduleError> {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut clock = self.clock.lock();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let deadline = clock.now.saturating_add(delay);
        clock.timers.push(ManualTimer {
            deadline,
            seq,
            stopped: Arc::clone(&stopped),
            action,
        });

        Ok(TimerHandle::with(StopSignal::Flag(stopped)))
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("timers", &clock.timers.len())
            .finish()
    }
}
