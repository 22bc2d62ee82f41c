//! Session controller.
//!
//! Owns the active project and at most one running [`Timer`]. Commands are
//! serialized by a dedicated mutex; timer callbacks arrive on the timer's
//! own thread and only ever take the short-lived state lock, never the
//! command lock, so a command may safely join a timer whose loop is in the
//! middle of a callback.
//!
//! Each launched timer carries a generation number. Commands that retire a
//! timer bump the generation first, so a late callback from a stopped or
//! replaced timer is recognized and dropped.

use std::mem;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{CommittedSession, EndReason, SessionPhase, SessionStatus};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::storage::{NewSession, ProjectStore, ProjectTotals};
use crate::timer::{Clock, Intervals, StepType, SystemClock, Timer, TimerEvent, TimerSpec};

#[derive(Debug, Clone)]
struct ActiveProject {
    id: i64,
    name: String,
}

/// One in-flight interval.
#[derive(Debug)]
struct Interval {
    timer: Timer,
    project: ActiveProject,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Focus {
        interval: Interval,
        awaiting_break: bool,
    },
    Break {
        interval: Interval,
    },
}

impl Phase {
    fn public(&self) -> SessionPhase {
        match self {
            Phase::Idle => SessionPhase::Idle,
            Phase::Focus {
                awaiting_break: false,
                ..
            } => SessionPhase::FocusRunning,
            Phase::Focus {
                awaiting_break: true,
                ..
            } => SessionPhase::FocusAwaitingBreak,
            Phase::Break { .. } => SessionPhase::BreakRunning,
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    phase: Phase,
    generation: u64,
}

struct Inner<S> {
    store: Mutex<S>,
    clock: Arc<dyn Clock>,
    intervals: Intervals,
    commands: Mutex<()>,
    state: Mutex<ControllerState>,
    subscribers: Mutex<Vec<SyncSender<Event>>>,
}

/// Events buffered per subscriber. Once full, further events are dropped
/// for that subscriber until it drains.
const EVENT_BUFFER: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives focus and break intervals for one project at a time and commits
/// each finished or interrupted interval to a [`ProjectStore`].
pub struct SessionController<S: ProjectStore + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: ProjectStore + 'static> SessionController<S> {
    /// Controller ticking on wall-clock seconds.
    pub fn new(store: S, intervals: Intervals) -> Self {
        Self::with_clock(store, intervals, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, intervals: Intervals, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                clock,
                intervals,
                commands: Mutex::new(()),
                state: Mutex::new(ControllerState {
                    phase: Phase::Idle,
                    generation: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Receive the [`Event`]s published from now on.
    ///
    /// Each receiver buffers a bounded number of events. A receiver that
    /// falls behind misses events until it catches up; dropping it
    /// unsubscribes.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = mpsc::sync_channel(EVENT_BUFFER);
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// Run `f` against the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.inner.store))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn intervals(&self) -> Intervals {
        self.inner.intervals
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.inner.state).phase.public()
    }

    /// Whether any focus or break timer is active.
    pub fn is_active(&self) -> bool {
        self.phase() != SessionPhase::Idle
    }

    pub fn current_project(&self) -> Option<String> {
        match &lock(&self.inner.state).phase {
            Phase::Idle => None,
            Phase::Focus { interval, .. } | Phase::Break { interval } => {
                Some(interval.project.name.clone())
            }
        }
    }

    /// Accrued seconds of the active interval, 0 while idle.
    pub fn elapsed_secs(&self) -> u64 {
        match &lock(&self.inner.state).phase {
            Phase::Idle => 0,
            Phase::Focus { interval, .. } | Phase::Break { interval } => {
                interval.timer.elapsed_secs()
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        let state = lock(&self.inner.state);
        let phase = state.phase.public();
        match &state.phase {
            Phase::Idle => SessionStatus {
                phase,
                project: None,
                elapsed_secs: 0,
                remaining_secs: 0,
                paused: false,
            },
            Phase::Focus { interval, .. } | Phase::Break { interval } => SessionStatus {
                phase,
                project: Some(interval.project.name.clone()),
                elapsed_secs: interval.timer.elapsed_secs(),
                remaining_secs: interval.timer.remaining_secs(),
                paused: interval.timer.is_paused(),
            },
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a focus interval for `project`, creating the project if needed.
    ///
    /// # Errors
    /// `EmptyProjectName` for a blank name, `AlreadyRunning` while any
    /// interval is active, `Persistence` if the project cannot be resolved.
    pub fn start_focus(&self, project: &str) -> Result<()> {
        let name = project.trim();
        if name.is_empty() {
            return Err(CoreError::EmptyProjectName);
        }
        let _command = lock(&self.inner.commands);
        if !matches!(lock(&self.inner.state).phase, Phase::Idle) {
            return Err(CoreError::AlreadyRunning);
        }

        let id = lock(&self.inner.store).resolve_or_create_project(name)?;
        let project = ActiveProject {
            id,
            name: name.to_string(),
        };

        let mut state = lock(&self.inner.state);
        Inner::begin_focus(&self.inner, &mut state, project)
    }

    /// Stop accruing focus time.
    ///
    /// # Errors
    /// `NoActiveSession` unless a focus interval is running and has not yet
    /// reached its target.
    pub fn pause(&self) -> Result<()> {
        self.toggle_pause(true)
    }

    /// # Errors
    /// Same conditions as [`SessionController::pause`].
    pub fn resume(&self) -> Result<()> {
        self.toggle_pause(false)
    }

    fn toggle_pause(&self, pause: bool) -> Result<()> {
        let _command = lock(&self.inner.commands);
        let state = lock(&self.inner.state);
        let Phase::Focus {
            interval,
            awaiting_break: false,
        } = &state.phase
        else {
            return Err(CoreError::NoActiveSession);
        };

        let at = self.inner.clock.now();
        let elapsed_secs = interval.timer.elapsed_secs();
        if pause {
            interval.timer.pause();
            tracing::info!(project = %interval.project.name, elapsed_secs, "focus paused");
            self.inner.publish(Event::Paused { elapsed_secs, at });
        } else {
            interval.timer.resume();
            tracing::info!(project = %interval.project.name, elapsed_secs, "focus resumed");
            self.inner.publish(Event::Resumed { elapsed_secs, at });
        }
        Ok(())
    }

    /// Close the overrunning focus interval, commit it, and start the break.
    ///
    /// # Errors
    /// `NoActiveSession` unless awaiting break confirmation. `CommitFailed`
    /// if the focus interval cannot be written; the controller is then idle
    /// and no break is started.
    pub fn confirm_break(&self) -> Result<CommittedSession> {
        let _command = lock(&self.inner.commands);
        let mut interval = {
            let mut state = lock(&self.inner.state);
            match mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Focus {
                    interval,
                    awaiting_break: true,
                } => {
                    state.generation += 1;
                    interval
                }
                other => {
                    state.phase = other;
                    return Err(CoreError::NoActiveSession);
                }
            }
        };

        interval.timer.stop();
        interval.timer.join();
        let committed = self.inner.commit(
            draft(&interval, StepType::Focus, self.inner.clock.now()),
            EndReason::Finished,
        )?;

        let mut state = lock(&self.inner.state);
        let timer = Inner::launch(&self.inner, &mut state, StepType::Break)?;
        let at = self.inner.clock.now();
        state.phase = Phase::Break {
            interval: Interval {
                timer,
                project: interval.project,
                started_at: at,
            },
        };
        tracing::info!(duration_secs = self.inner.intervals.break_secs, "break started");
        self.inner.publish(Event::BreakStarted {
            duration_secs: self.inner.intervals.break_secs,
            at,
        });
        Ok(committed)
    }

    /// Stop whatever interval is active and commit the time accrued so far.
    ///
    /// # Errors
    /// `NoActiveSession` while idle. `CommitFailed` if the interval cannot be
    /// written; the controller is idle either way.
    pub fn stop(&self) -> Result<CommittedSession> {
        let _command = lock(&self.inner.commands);
        let (mut interval, step_type) = {
            let mut state = lock(&self.inner.state);
            let taken = match mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Idle => return Err(CoreError::NoActiveSession),
                Phase::Focus { interval, .. } => (interval, StepType::Focus),
                Phase::Break { interval } => (interval, StepType::Break),
            };
            state.generation += 1;
            taken
        };

        interval.timer.stop();
        interval.timer.join();
        let reason = if interval.timer.duration_reached() {
            EndReason::Finished
        } else {
            EndReason::Stopped
        };
        let at = self.inner.clock.now();
        let committed = self
            .inner
            .commit(draft(&interval, step_type, at), reason);
        self.inner.publish(Event::Stopped { at });
        committed
    }

    /// Re-attempt a commit that previously failed with `CommitFailed`.
    ///
    /// # Errors
    /// `CommitFailed` again if the store still rejects it.
    pub fn recommit(&self, session: NewSession, reason: EndReason) -> Result<CommittedSession> {
        let _command = lock(&self.inner.commands);
        self.inner.commit(session, reason)
    }

    /// # Errors
    /// `EmptyProjectName` for a blank name, `Persistence` on store failure.
    pub fn add_project(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::EmptyProjectName);
        }
        Ok(lock(&self.inner.store).add_project(name)?)
    }

    /// # Errors
    /// `Persistence` on store failure.
    pub fn list_active_projects(&self) -> Result<Vec<ProjectTotals>> {
        Ok(lock(&self.inner.store).active_project_totals()?)
    }
}

fn draft(interval: &Interval, step_type: StepType, ended_at: DateTime<Utc>) -> NewSession {
    NewSession {
        project_id: interval.project.id,
        project_name: interval.project.name.clone(),
        step_type,
        started_at: interval.started_at,
        ended_at,
        duration_secs: interval.timer.elapsed_secs(),
    }
}

impl<S: ProjectStore + 'static> Inner<S> {
    fn publish(&self, event: Event) {
        lock(&self.subscribers).retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn commit(&self, session: NewSession, reason: EndReason) -> Result<CommittedSession> {
        let result = lock(&self.store).record_session(&session);
        match result {
            Ok(record_id) => {
                tracing::info!(
                    project = %session.project_name,
                    step = session.step_type.as_str(),
                    duration_secs = session.duration_secs,
                    reason = reason.as_str(),
                    "session committed"
                );
                self.publish(Event::SessionCommitted {
                    project: session.project_name.clone(),
                    step_type: session.step_type,
                    duration_secs: session.duration_secs,
                    reason,
                    at: session.ended_at,
                });
                Ok(CommittedSession {
                    record_id,
                    session,
                    reason,
                })
            }
            Err(source) => {
                tracing::warn!(
                    project = %session.project_name,
                    duration_secs = session.duration_secs,
                    "session commit failed: {source}"
                );
                Err(CoreError::CommitFailed {
                    draft: session,
                    reason,
                    source,
                })
            }
        }
    }

    /// Start a timer for `step_type` that reports back under a fresh
    /// generation.
    fn launch(
        inner: &Arc<Self>,
        state: &mut ControllerState,
        step_type: StepType,
    ) -> Result<Timer> {
        state.generation += 1;
        let generation = state.generation;
        let target_secs = inner.intervals.duration_secs(step_type);
        let spec = if step_type.allows_overrun() {
            TimerSpec::focus(target_secs)
        } else {
            TimerSpec::rest(target_secs)
        };
        let weak = Arc::downgrade(inner);
        let mut timer = Timer::new(spec, Arc::clone(&inner.clock), move |event| {
            if let Some(inner) = weak.upgrade() {
                Inner::on_timer_event(&inner, generation, step_type, event);
            }
        });
        timer.start()?;
        Ok(timer)
    }

    fn begin_focus(
        inner: &Arc<Self>,
        state: &mut ControllerState,
        project: ActiveProject,
    ) -> Result<()> {
        let timer = Self::launch(inner, state, StepType::Focus)?;
        let at = inner.clock.now();
        tracing::info!(
            project = %project.name,
            duration_secs = inner.intervals.focus_secs,
            "focus started"
        );
        inner.publish(Event::FocusStarted {
            project: project.name.clone(),
            duration_secs: inner.intervals.focus_secs,
            at,
        });
        state.phase = Phase::Focus {
            interval: Interval {
                timer,
                project,
                started_at: at,
            },
            awaiting_break: false,
        };
        Ok(())
    }

    /// Runs on the timer's loop thread.
    fn on_timer_event(inner: &Arc<Self>, generation: u64, step_type: StepType, event: TimerEvent) {
        match event {
            TimerEvent::Tick {
                elapsed_secs,
                remaining_secs,
            } => inner.publish(Event::Tick {
                step_type,
                elapsed_secs,
                remaining_secs,
            }),
            TimerEvent::DurationReached { elapsed_secs } if step_type == StepType::Focus => {
                let mut state = lock(&inner.state);
                if state.generation != generation {
                    return;
                }
                if let Phase::Focus {
                    interval,
                    awaiting_break,
                } = &mut state.phase
                {
                    *awaiting_break = true;
                    tracing::info!(project = %interval.project.name, elapsed_secs, "focus target reached");
                    inner.publish(Event::AwaitingBreak {
                        project: interval.project.name.clone(),
                        elapsed_secs,
                        at: inner.clock.now(),
                    });
                }
            }
            TimerEvent::NaturalFinish { .. } if step_type == StepType::Break => {
                let mut state = lock(&inner.state);
                if state.generation != generation {
                    return;
                }
                let interval = match mem::replace(&mut state.phase, Phase::Idle) {
                    Phase::Break { interval } => interval,
                    other => {
                        state.phase = other;
                        return;
                    }
                };
                tracing::info!(project = %interval.project.name, "break finished");
                inner.publish(Event::BreakFinished {
                    at: inner.clock.now(),
                });
                let project = interval.project.clone();
                // The finished break timer is dropped here, on its own loop
                // thread; dropping never joins.
                drop(interval);
                if let Err(e) = Self::begin_focus(inner, &mut state, project) {
                    tracing::error!("could not start the next focus interval: {e}");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::timer::ManualClock;

    #[test]
    fn undrained_subscriber_is_capped() {
        let clock = ManualClock::default();
        let controller = SessionController::with_clock(
            Database::open_memory().unwrap(),
            Intervals::new(10_000, 300),
            Arc::new(clock.clone()),
        );
        let idle = controller.subscribe();
        controller.start_focus("Writing").unwrap();
        clock.advance(EVENT_BUFFER as u64 + 40);

        let late = controller.subscribe();
        clock.advance(2);
        controller.stop().unwrap();

        assert_eq!(idle.try_iter().count(), EVENT_BUFFER);
        // Two ticks, the commit and the stop.
        assert_eq!(late.try_iter().count(), 4);
        assert_eq!(lock(&controller.inner.subscribers).len(), 2);
    }

    #[test]
    fn dropped_subscriber_is_forgotten() {
        let controller = SessionController::with_clock(
            Database::open_memory().unwrap(),
            Intervals::new(10, 5),
            Arc::new(ManualClock::default()),
        );
        drop(controller.subscribe());
        controller.start_focus("Writing").unwrap();
        controller.stop().unwrap();
        assert!(lock(&controller.inner.subscribers).is_empty());
    }
}
