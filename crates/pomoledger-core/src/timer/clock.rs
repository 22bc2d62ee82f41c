//! Tick sources for the timer.
//!
//! A [`Clock`] hands each timer its own [`Ticker`]; the tick loop blocks in
//! [`Ticker::wait`] between ticks. [`SystemClock`] ticks once per wall-clock
//! second, [`ManualClock`] ticks only when told to and is what tests and
//! simulations use.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// One tick per second.
pub const TICK: Duration = Duration::from_secs(1);

/// Source of wall-clock time and tick cadence.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Create the ticker for one timer's loop. Called from `Timer::start`
    /// before the loop thread is spawned.
    fn ticker(&self) -> Box<dyn Ticker>;
}

/// Per-loop tick cadence.
pub trait Ticker: Send {
    /// Block until the next tick is due. Returns `false` as soon as `stop`
    /// is raised, without waiting out the rest of the period.
    fn wait(&mut self, stop: &StopSignal) -> bool;
}

/// Stop flag that can interrupt a sleeping tick loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake any waiter. Idempotent.
    pub fn raise(&self) {
        let (lock, cv) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cv.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`, returning early when raised.
    /// Returns whether the flag is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cv) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cv
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// ── System clock ─────────────────────────────────────────────────────

/// Real time: ticks land on a fixed one-second grid from the moment the
/// ticker was created, so slow tick handling does not push later ticks back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn ticker(&self) -> Box<dyn Ticker> {
        Box::new(SystemTicker {
            next_deadline: Instant::now(),
        })
    }
}

struct SystemTicker {
    next_deadline: Instant,
}

impl Ticker for SystemTicker {
    fn wait(&mut self, stop: &StopSignal) -> bool {
        self.next_deadline += TICK;
        let now = Instant::now();
        if self.next_deadline > now && stop.wait_timeout(self.next_deadline - now) {
            return false;
        }
        !stop.is_raised()
    }
}

// ── Manual clock ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ManualState {
    /// Ticks granted but not yet taken by a ticker.
    pending: u64,
    /// Every tick ever granted; drives `now()`.
    granted: u64,
    /// Live tickers.
    attached: usize,
    /// Tickers currently parked in `wait`.
    parked: usize,
}

/// A clock that only moves when [`ManualClock::advance`] is called.
///
/// `advance` returns once every granted tick has been taken and the loops
/// that took them have finished handling it (they are parked again or have
/// exited), so assertions made right after it see the effects of the tick,
/// including any callbacks the tick triggered.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: DateTime<Utc>,
    shared: Arc<(Mutex<ManualState>, Condvar)>,
}

const MANUAL_POLL: Duration = Duration::from_millis(5);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            shared: Arc::new((Mutex::new(ManualState::default()), Condvar::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `ticks` ticks, one at a time.
    pub fn advance(&self, ticks: u64) {
        let cv = &self.shared.1;
        for _ in 0..ticks {
            let mut state = self.lock();
            state.granted += 1;
            if state.attached == 0 {
                // Nobody is listening; time still moves.
                continue;
            }
            state.pending += 1;
            cv.notify_all();
            while !(state.pending == 0 && state.parked == state.attached) {
                if state.attached == 0 {
                    state.pending = 0;
                    break;
                }
                state = cv
                    .wait_timeout(state, MANUAL_POLL)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }

    /// Ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.lock().granted
    }

    /// Number of tick loops currently alive.
    pub fn active_loops(&self) -> usize {
        self.lock().attached
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let granted = i64::try_from(self.ticks()).unwrap_or(i64::MAX);
        self.start + chrono::Duration::seconds(granted)
    }

    fn ticker(&self) -> Box<dyn Ticker> {
        self.lock().attached += 1;
        Box::new(ManualTicker {
            clock: self.clone(),
        })
    }
}

struct ManualTicker {
    clock: ManualClock,
}

impl Ticker for ManualTicker {
    fn wait(&mut self, stop: &StopSignal) -> bool {
        let cv = &self.clock.shared.1;
        let mut state = self.clock.lock();
        state.parked += 1;
        cv.notify_all();
        loop {
            if stop.is_raised() {
                state.parked -= 1;
                cv.notify_all();
                return false;
            }
            if state.pending > 0 {
                state.pending -= 1;
                state.parked -= 1;
                cv.notify_all();
                return true;
            }
            state = cv
                .wait_timeout(state, MANUAL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Drop for ManualTicker {
    fn drop(&mut self) {
        let mut state = self.clock.lock();
        state.attached -= 1;
        self.clock.shared.1.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_interrupts_wait() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        stop.raise();
        assert!(handle.join().unwrap());
        stop.raise();
        assert!(stop.is_raised());
    }

    #[test]
    fn manual_clock_moves_without_listeners() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(3);
        assert_eq!(clock.ticks(), 3);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(3));
    }

    #[test]
    fn manual_ticker_counts_ticks() {
        let clock = ManualClock::default();
        let stop = StopSignal::new();
        let mut ticker = clock.ticker();
        let loop_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut seen = 0;
            while ticker.wait(&loop_stop) {
                seen += 1;
            }
            seen
        });
        clock.advance(4);
        stop.raise();
        assert_eq!(handle.join().unwrap(), 4);
        assert_eq!(clock.active_loops(), 0);
    }

    #[test]
    fn system_ticker_returns_false_once_stopped() {
        let stop = StopSignal::new();
        stop.raise();
        let mut ticker = SystemClock.ticker();
        let started = Instant::now();
        assert!(!ticker.wait(&stop));
        assert!(started.elapsed() < TICK);
    }
}
