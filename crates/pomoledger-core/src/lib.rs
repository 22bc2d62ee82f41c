//! # pomoledger Core Library
//!
//! Business logic for the pomoledger work-interval tracker: focus intervals
//! run against a named project, a break follows each confirmed focus
//! interval, and every elapsed second of work ends up in a ledger that
//! reports all-time and weekly totals.
//!
//! ## Architecture
//!
//! - **Timer**: a single-use, pausable one-second countdown running on its
//!   own thread, optionally overrunning its target
//! - **Session controller**: the focus -> break -> focus state machine that
//!   commits each interval
//! - **Storage**: SQLite ledger and TOML configuration
//!
//! ## Key Components
//!
//! - [`Timer`]: countdown with overrun and a duration-reached latch
//! - [`SessionController`]: command surface used by the shell
//! - [`Database`]: the [`ProjectStore`] implementation
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod report;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use report::{format_hms, render_project_list};
pub use session::{CommittedSession, EndReason, SessionController, SessionPhase, SessionStatus};
pub use storage::{Config, Database, NewSession, ProjectStore, ProjectTotals, SessionRecord};
pub use timer::{
    Clock, Intervals, ManualClock, StepType, SystemClock, Timer, TimerEvent, TimerSpec,
    TimerState,
};
