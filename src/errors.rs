//! Error handling module for the interval timer.

use thiserror::Error;

/// Custom error type for Timer operations.
///
/// Failures of the invoked callable are deliberately absent: a panicking
/// callable unwinds its execution path and is only observable through
/// [`Timer::join`](crate::Timer::join).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// No tokio runtime was supplied and none is current on this thread.
    #[error("No tokio runtime available to spawn the timer task.")]
    NoRuntime,
}
