//! Focus/break session orchestration.
//!
//! ```text
//!            start_focus                 duration reached
//!   Idle ───────────────▶ FocusRunning ──────────────────▶ FocusAwaitingBreak
//!    ▲                        ▲                                   │
//!    │ stop (any state)       │ break finishes                    │ confirm_break
//!    │                        └────────── BreakRunning ◀──────────┘
//! ```

mod controller;

pub use controller::SessionController;

use serde::{Deserialize, Serialize};

use crate::storage::NewSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    FocusRunning,
    /// Focus target reached; still overrunning until the break is confirmed.
    FocusAwaitingBreak,
    BreakRunning,
}

/// Why an interval was committed. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Interrupted before reaching its target.
    Stopped,
    /// Ended at or after its target.
    Finished,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Stopped => "stopped",
            EndReason::Finished => "finished",
        }
    }
}

/// An interval that made it into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedSession {
    pub record_id: i64,
    pub session: NewSession,
    pub reason: EndReason,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub project: Option<String>,
    pub elapsed_secs: u64,
    /// Negative while a focus interval overruns.
    pub remaining_secs: i64,
    pub paused: bool,
}
