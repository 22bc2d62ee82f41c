pub mod clock;
mod engine;
mod schedule;

pub use clock::{Clock, ManualClock, StopSignal, SystemClock, Ticker};
pub use engine::{EventHandler, Timer, TimerEvent, TimerSpec, TimerState};
pub use schedule::{Intervals, StepType, DEFAULT_BREAK_SECS, DEFAULT_FOCUS_SECS};
