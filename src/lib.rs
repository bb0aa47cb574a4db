//! # interval-timer
//! A generic timer that invokes a closure once after a delay, or repeatedly at
//! that interval, on a background tokio task.

pub mod errors;
pub mod policy;
pub mod timer;

pub use errors::TimerError;
pub use policy::{ExecutionPath, RunPolicy, StandardPolicy};
pub use timer::{Timer, TimerMode, TimerState, TimerStatistics};
