//! Interval timer implementation.
//!
//! A [`Timer`] owns one tick loop running on its own thread. The loop
//! accrues one second per tick while not paused and reports lifecycle
//! events to a single handler. All counters shared between the loop and the
//! owning thread live behind one mutex; handlers are always invoked with
//! that mutex released.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!         Running -> Overrun             (overrun allowed, target reached)
//!         Running -> Finished            (overrun disallowed, target reached)
//!         Running | Paused | Overrun -> Stopped
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = Timer::new(TimerSpec::focus(1500), clock, |event| { ... });
//! timer.start()?;
//! // later:
//! timer.stop();
//! timer.join();
//! let secs = timer.elapsed_secs();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use super::clock::{Clock, StopSignal, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    /// Target reached, still running because overrun is allowed.
    Overrun,
    /// Target reached with overrun disallowed; the loop has ended.
    Finished,
    /// Ended by `stop()`.
    Stopped,
}

/// Lifecycle notifications delivered to the timer's handler, on the loop
/// thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { elapsed_secs: u64, remaining_secs: i64 },
    /// Fires at most once per timer, when elapsed first reaches the target.
    DurationReached { elapsed_secs: u64 },
    /// Overrun-disallowed timers only; the loop exits right after.
    NaturalFinish { elapsed_secs: u64 },
    /// The loop exited because of `stop()`.
    Stopped { elapsed_secs: u64 },
}

pub type EventHandler = Box<dyn FnMut(TimerEvent) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSpec {
    pub target_secs: u64,
    pub allow_overrun: bool,
}

impl TimerSpec {
    pub fn focus(target_secs: u64) -> Self {
        Self {
            target_secs,
            allow_overrun: true,
        }
    }

    pub fn rest(target_secs: u64) -> Self {
        Self {
            target_secs,
            allow_overrun: false,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    target_secs: u64,
    allow_overrun: bool,
    elapsed_secs: u64,
    started: bool,
    running: bool,
    paused: bool,
    /// Latch for `DurationReached`.
    reached: bool,
    finished: bool,
    stop_requested: bool,
}

#[derive(Debug, Default)]
struct TickOutcome {
    accrued: Option<(u64, i64)>,
    reached: bool,
    finished: bool,
}

impl Counters {
    fn remaining_secs(&self) -> i64 {
        let target = i64::try_from(self.target_secs).unwrap_or(i64::MAX);
        let elapsed = i64::try_from(self.elapsed_secs).unwrap_or(i64::MAX);
        target.saturating_sub(elapsed)
    }

    fn tick(&mut self) -> TickOutcome {
        if self.paused {
            return TickOutcome::default();
        }
        self.elapsed_secs += 1;
        let mut outcome = self.check_target();
        outcome.accrued = Some((self.elapsed_secs, self.remaining_secs()));
        outcome
    }

    fn check_target(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.elapsed_secs < self.target_secs {
            return outcome;
        }
        if !self.reached {
            self.reached = true;
            outcome.reached = true;
        }
        if !self.allow_overrun {
            self.finished = true;
            self.running = false;
            outcome.finished = true;
        }
        outcome
    }

    fn state(&self) -> TimerState {
        if !self.started {
            TimerState::Idle
        } else if self.finished {
            TimerState::Finished
        } else if self.stop_requested {
            TimerState::Stopped
        } else if self.paused {
            TimerState::Paused
        } else if self.reached {
            TimerState::Overrun
        } else {
            TimerState::Running
        }
    }
}

/// Single-use countdown with optional overrun.
pub struct Timer {
    spec: TimerSpec,
    counters: Arc<Mutex<Counters>>,
    stop: StopSignal,
    clock: Arc<dyn Clock>,
    handler: Option<EventHandler>,
    handle: Option<JoinHandle<()>>,
}

fn lock(counters: &Mutex<Counters>) -> MutexGuard<'_, Counters> {
    counters.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Timer {
    /// Create an idle timer. `handler` receives every [`TimerEvent`].
    pub fn new<F>(spec: TimerSpec, clock: Arc<dyn Clock>, handler: F) -> Self
    where
        F: FnMut(TimerEvent) + Send + 'static,
    {
        let counters = Counters {
            target_secs: spec.target_secs,
            allow_overrun: spec.allow_overrun,
            ..Counters::default()
        };
        Self {
            spec,
            counters: Arc::new(Mutex::new(counters)),
            stop: StopSignal::new(),
            clock,
            handler: Some(Box::new(handler)),
            handle: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        lock(&self.counters).state()
    }

    pub fn elapsed_secs(&self) -> u64 {
        lock(&self.counters).elapsed_secs
    }

    /// Seconds left until the target; negative while overrunning.
    pub fn remaining_secs(&self) -> i64 {
        lock(&self.counters).remaining_secs()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.counters).running
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.counters).paused
    }

    pub fn duration_reached(&self) -> bool {
        lock(&self.counters).reached
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Spawn the tick loop and return immediately. A timer starts at most
    /// once; later calls do nothing.
    ///
    /// # Errors
    /// Returns an error if the loop thread cannot be spawned.
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some(handler) = self.handler.take() else {
            return Ok(());
        };
        {
            let mut counters = lock(&self.counters);
            counters.started = true;
            counters.running = true;
        }
        let ticker = self.clock.ticker();
        let counters = Arc::clone(&self.counters);
        let stop = self.stop.clone();
        let spawned = std::thread::Builder::new()
            .name("pomoledger-timer".into())
            .spawn(move || run_loop(&counters, &stop, ticker, handler));
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                lock(&self.counters).running = false;
                Err(e)
            }
        }
    }

    /// Stop accruing time. The loop keeps ticking.
    pub fn pause(&self) {
        lock(&self.counters).paused = true;
    }

    pub fn resume(&self) {
        lock(&self.counters).paused = false;
    }

    /// Ask the loop to exit and return without waiting for it. No-op after
    /// natural finish or a previous stop.
    pub fn stop(&self) {
        {
            let mut counters = lock(&self.counters);
            if counters.finished || counters.stop_requested {
                return;
            }
            counters.stop_requested = true;
        }
        self.stop.raise();
    }

    /// Wait for the loop thread to exit. Returns immediately when the timer
    /// was never started, was already joined, or when called from the loop
    /// thread itself.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("timer loop panicked");
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        // Detach: the loop notices the stop signal and exits by itself.
        self.stop();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counters = lock(&self.counters);
        f.debug_struct("Timer")
            .field("spec", &self.spec)
            .field("state", &counters.state())
            .field("elapsed_secs", &counters.elapsed_secs)
            .finish()
    }
}

fn run_loop(
    counters: &Mutex<Counters>,
    stop: &StopSignal,
    mut ticker: Box<dyn Ticker>,
    mut on_event: EventHandler,
) {
    // A zero-length target is reached before the first tick.
    let (initial, elapsed_secs) = {
        let mut guard = lock(counters);
        (guard.check_target(), guard.elapsed_secs)
    };
    if dispatch(&initial, elapsed_secs, &mut on_event) {
        return;
    }

    loop {
        if !ticker.wait(stop) {
            break;
        }
        let outcome = {
            let mut guard = lock(counters);
            if guard.stop_requested {
                break;
            }
            guard.tick()
        };
        if let Some((elapsed_secs, remaining_secs)) = outcome.accrued {
            tracing::trace!(elapsed_secs, remaining_secs, "tick");
            on_event(TimerEvent::Tick {
                elapsed_secs,
                remaining_secs,
            });
            if dispatch(&outcome, elapsed_secs, &mut on_event) {
                return;
            }
        }
    }

    let elapsed_secs = {
        let mut guard = lock(counters);
        guard.running = false;
        guard.elapsed_secs
    };
    on_event(TimerEvent::Stopped { elapsed_secs });
}

/// Deliver threshold events. Returns true when the loop must end.
fn dispatch(outcome: &TickOutcome, elapsed_secs: u64, on_event: &mut EventHandler) -> bool {
    if outcome.reached {
        on_event(TimerEvent::DurationReached { elapsed_secs });
    }
    if outcome.finished {
        on_event(TimerEvent::NaturalFinish { elapsed_secs });
        return true;
    }
    false
}
