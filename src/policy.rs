//! Run policies: the algorithm an execution path follows between `start` and
//! its termination.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "logging")]
use log::{debug, error};
use tokio::task;
use tokio::time;

use crate::timer::{lock, Shared, TimerMode, TimerState};

/// A pluggable scheduling algorithm for a [`Timer`](crate::Timer).
///
/// `run` is called once per activation on a freshly spawned task. It returns
/// when the activation is over; the timer is then marked stopped unless a
/// `stop()` or a newer `start()` already took care of it.
#[async_trait]
pub trait RunPolicy<F>: Send + Sync + 'static
where
    F: FnMut() + Send + 'static,
{
    /// Drives one activation of the timer.
    async fn run(&self, path: &ExecutionPath<F>);
}

/// Wait, check, invoke; repeat while the mode is repeating.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy;

#[async_trait]
impl<F> RunPolicy<F> for StandardPolicy
where
    F: FnMut() + Send + 'static,
{
    async fn run(&self, path: &ExecutionPath<F>) {
        loop {
            if !path.wait().await {
                return;
            }
            path.invoke();
            // Mode is re-read after every invocation so a switch made while
            // running takes effect on the current iteration.
            if path.mode() == TimerMode::SingleShot {
                return;
            }
        }
    }
}

/// The view of a timer held by one execution path.
///
/// It shares ownership of the timer state, so dropping the [`Timer`](crate::Timer)
/// while a path is sleeping or invoking is sound. Dropping the path itself
/// (return, panic unwind or runtime shutdown) marks its activation finished.
pub struct ExecutionPath<F> {
    shared: Arc<Shared<F>>,
    activation: u64,
}

impl<F> ExecutionPath<F> {
    pub(crate) fn new(shared: Arc<Shared<F>>, activation: u64) -> Self {
        ExecutionPath { shared, activation }
    }

    /// Check point: true while the timer runs and no newer activation exists.
    pub fn is_active(&self) -> bool {
        let control = self.shared.control();
        control.state == TimerState::Running && control.activation == self.activation
    }

    /// Current mode of the timer.
    pub fn mode(&self) -> TimerMode {
        self.shared.control().mode
    }

    /// Current delay of the timer.
    pub fn delay(&self) -> Duration {
        self.shared.control().delay
    }

    /// Sleeps for the current delay between two check points.
    ///
    /// Returns `false` if the activation ended before or during the wait. A
    /// `stop()` issued during the sleep cuts it short.
    pub async fn wait(&self) -> bool {
        // Registered before the check so a concurrent stop cannot slip between.
        let stop_requested = self.shared.stop_notify.notified();
        if !self.is_active() {
            return false;
        }

        let delay = self.delay();
        if delay.is_zero() {
            task::yield_now().await;
        } else {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = stop_requested => {}
            }
        }

        self.is_active()
    }

    /// Invokes the current callable once and records it.
    ///
    /// The callable is taken out of the timer for the call and put back
    /// afterwards unless it was replaced in the meantime. A replacement made
    /// during the call is therefore used whole from the next invocation.
    ///
    /// Returns `false` without invoking when the callable is already out, which
    /// happens only while a superseded activation is still inside its call.
    pub fn invoke(&self) -> bool
    where
        F: FnMut(),
    {
        let taken = lock(&self.shared.callable).take();
        let Some((callable, generation)) = taken else {
            return false;
        };

        {
            let mut held = Held {
                path: self,
                callable: Some(callable),
                generation,
            };
            if let Some(callable) = held.callable.as_mut() {
                callable();
            }
        }

        let started_at = self.shared.control().started_at;
        let mut statistics = lock(&self.shared.statistics);
        statistics.execution_count += 1;
        if let Some(started_at) = started_at {
            statistics.elapsed_time = started_at.elapsed();
        }
        true
    }

    /// Ends this activation, marking the timer stopped.
    ///
    /// Returns `false` when the activation was already stopped or superseded,
    /// in which case the timer state is left untouched.
    pub fn finish(&self) -> bool {
        let mut control = self.shared.control();
        if control.state == TimerState::Running && control.activation == self.activation {
            control.state = TimerState::Stopped;
            true
        } else {
            false
        }
    }
}

impl<F> Drop for ExecutionPath<F> {
    fn drop(&mut self) {
        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        let finished = self.finish();
        #[cfg(feature = "logging")]
        {
            if finished {
                debug!("Timer activation {} completed.", self.activation);
            } else {
                debug!("Timer activation {} ended.", self.activation);
            }
        }
    }
}

/// A callable taken out of its timer for one call.
///
/// Dropping it puts the callable back, also while a panicking callable
/// unwinds, in which case the activation is marked finished as well.
struct Held<'a, F> {
    path: &'a ExecutionPath<F>,
    callable: Option<F>,
    generation: u64,
}

impl<F> Drop for Held<'_, F> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            #[cfg(feature = "logging")]
            error!(
                "Timer callable panicked, activation {} ended.",
                self.path.activation
            );
            self.path.finish();
        }

        if let Some(callable) = self.callable.take() {
            // A replaced callable is dropped outside the lock.
            let replaced = lock(&self.path.shared.callable).restore(callable, self.generation);
            drop(replaced);
        }
    }
}
