use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default focus interval length.
pub const DEFAULT_FOCUS_SECS: u64 = 25 * 60;
/// Default break interval length.
pub const DEFAULT_BREAK_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Focus,
    Break,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Focus => "focus",
            StepType::Break => "break",
        }
    }

    /// Focus intervals keep running past their target until confirmed;
    /// breaks end on their own.
    pub fn allows_overrun(&self) -> bool {
        matches!(self, StepType::Focus)
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focus" => Ok(StepType::Focus),
            "break" => Ok(StepType::Break),
            _ => Err(format!("Unknown step type: {s}")),
        }
    }
}

/// Nominal lengths of the focus/break pair, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervals {
    pub focus_secs: u64,
    pub break_secs: u64,
}

impl Intervals {
    pub fn new(focus_secs: u64, break_secs: u64) -> Self {
        Self {
            focus_secs,
            break_secs,
        }
    }

    /// Build from minute values, saturating on overflow.
    pub fn from_minutes(focus_min: u64, break_min: u64) -> Self {
        Self {
            focus_secs: focus_min.saturating_mul(60),
            break_secs: break_min.saturating_mul(60),
        }
    }

    pub fn duration_secs(&self, step_type: StepType) -> u64 {
        match step_type {
            StepType::Focus => self.focus_secs,
            StepType::Break => self.break_secs,
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_SECS, DEFAULT_BREAK_SECS)
    }
}
