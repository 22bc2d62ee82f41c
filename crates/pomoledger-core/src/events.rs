use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::EndReason;
use crate::timer::StepType;

/// Every state change of the session controller produces an Event.
/// The shell renders them; tests assert on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    FocusStarted {
        project: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// One accrued second of the active interval.
    /// `remaining_secs` goes negative once a focus interval overruns.
    Tick {
        step_type: StepType,
        elapsed_secs: u64,
        remaining_secs: i64,
    },
    Paused {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Focus target reached; the timer keeps running until the break is
    /// confirmed.
    AwaitingBreak {
        project: String,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    BreakStarted {
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    BreakFinished {
        at: DateTime<Utc>,
    },
    SessionCommitted {
        project: String,
        step_type: StepType,
        duration_secs: u64,
        reason: EndReason,
        at: DateTime<Utc>,
    },
    Stopped {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Progress line for a tick: `Time left: MM:SS` while counting down,
    /// `Overtime: +MM:SS` once past the target.
    pub fn progress_line(&self) -> Option<String> {
        match self {
            Event::Tick { remaining_secs, .. } => {
                let secs = remaining_secs.unsigned_abs();
                let (m, s) = (secs / 60, secs % 60);
                Some(if *remaining_secs >= 0 {
                    format!("Time left: {m:02}:{s:02}")
                } else {
                    format!("Overtime: +{m:02}:{s:02}")
                })
            }
            _ => None,
        }
    }
}
