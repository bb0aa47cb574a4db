use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(feature = "logging")]
use log::debug;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::errors::TimerError;
use crate::policy::{ExecutionPath, RunPolicy, StandardPolicy};

/// Execution policy of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// Invoke once after the delay, then stop.
    #[default]
    SingleShot,
    /// Invoke once per delay until stopped.
    Repeating,
}

/// Represents the state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Stopped,
}

/// Statistics for a timer.
#[derive(Debug, Clone, Default)]
pub struct TimerStatistics {
    /// Number of times the callable has been invoked, across all activations.
    pub execution_count: usize,
    /// Time between the latest start and the latest invocation.
    pub elapsed_time: Duration,
}

pub(crate) struct Control {
    pub(crate) state: TimerState,
    pub(crate) activation: u64,
    pub(crate) mode: TimerMode,
    pub(crate) delay: Duration,
    pub(crate) started_at: Option<Instant>,
}

/// Holds the callable between invocations.
///
/// The execution path takes the value out for the duration of a call, so the
/// lock is never held while user code runs. Every replacement bumps
/// `generation`; a taken value is only put back if the generation it was taken
/// at is still current.
pub(crate) struct CallableSlot<F> {
    callable: Option<F>,
    generation: u64,
}

impl<F> CallableSlot<F> {
    pub(crate) fn take(&mut self) -> Option<(F, u64)> {
        self.callable.take().map(|callable| (callable, self.generation))
    }

    /// Puts a taken callable back, or hands it back if it was replaced meanwhile.
    pub(crate) fn restore(&mut self, callable: F, generation: u64) -> Option<F> {
        if self.generation == generation && self.callable.is_none() {
            self.callable = Some(callable);
            None
        } else {
            Some(callable)
        }
    }

    fn replace(&mut self, callable: F) -> Option<F> {
        self.generation += 1;
        self.callable.replace(callable)
    }
}

/// State shared between a timer and its execution path.
pub(crate) struct Shared<F> {
    pub(crate) control: Mutex<Control>,
    pub(crate) callable: Mutex<CallableSlot<F>>,
    pub(crate) statistics: Mutex<TimerStatistics>,
    pub(crate) stop_notify: Notify,
}

impl<F> Shared<F> {
    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }

    fn request_stop(&self) {
        let mut control = self.control();
        if control.state == TimerState::Running {
            control.state = TimerState::Stopped;
            drop(control);
            #[cfg(feature = "logging")]
            debug!("Stopping timer.");
            self.stop_notify.notify_waiters();
        }
    }
}

/// Locks a mutex, recovering the guard if a panicking callable poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Invokes a callable once after a delay, or repeatedly at that interval, on a
/// background tokio task.
///
/// Every accessor takes `&self`; mode, delay and callable may be changed while
/// the timer runs, also from inside the callable, and are picked up at the next
/// check point of the running task. None of them waits for an invocation in
/// progress. Dropping the timer stops it.
///
/// A panic inside the callable is not caught: it unwinds the background task,
/// the timer becomes stopped, and the panic resurfaces from [`Timer::join`].
///
/// ```no_run
/// # use std::time::Duration;
/// # use interval_timer::{Timer, TimerMode};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), interval_timer::TimerError> {
/// let timer = Timer::new(|| println!("tick"), Duration::from_millis(500), TimerMode::Repeating);
/// timer.start()?;
/// tokio::time::sleep(Duration::from_secs(2)).await;
/// timer.stop();
/// # Ok(())
/// # }
/// ```
pub struct Timer<F, P = StandardPolicy> {
    shared: Arc<Shared<F>>,
    policy: Arc<P>,
    runtime: Option<Handle>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<F> Timer<F>
where
    F: FnMut() + Send + 'static,
{
    /// Creates a stopped timer.
    pub fn new(callable: F, delay: Duration, mode: TimerMode) -> Self {
        Self::with_policy(callable, delay, mode, StandardPolicy)
    }

    /// Creates a stopped timer that fires once.
    pub fn single_shot(callable: F, delay: Duration) -> Self {
        Self::new(callable, delay, TimerMode::SingleShot)
    }

    /// Creates a stopped timer that fires every `interval`.
    pub fn repeating(callable: F, interval: Duration) -> Self {
        Self::new(callable, interval, TimerMode::Repeating)
    }

    /// Creates a stopped timer with a delay given in milliseconds.
    pub fn from_millis(callable: F, millis: u64, mode: TimerMode) -> Self {
        Self::new(callable, Duration::from_millis(millis), mode)
    }
}

impl<F, P> Timer<F, P>
where
    F: FnMut() + Send + 'static,
    P: RunPolicy<F>,
{
    /// Creates a stopped timer driven by a custom run policy.
    pub fn with_policy(callable: F, delay: Duration, mode: TimerMode, policy: P) -> Self {
        Timer {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: TimerState::Stopped,
                    activation: 0,
                    mode,
                    delay,
                    started_at: None,
                }),
                callable: Mutex::new(CallableSlot {
                    callable: Some(callable),
                    generation: 0,
                }),
                statistics: Mutex::new(TimerStatistics::default()),
                stop_notify: Notify::new(),
            }),
            policy: Arc::new(policy),
            runtime: None,
            handle: Mutex::new(None),
        }
    }

    /// Spawns execution paths on `runtime` instead of the current runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Starts the timer. Does nothing if it is already running.
    ///
    /// Fails only when no runtime was given through [`Timer::with_runtime`]
    /// and the caller is not inside one; the timer then stays stopped.
    pub fn start(&self) -> Result<&Self, TimerError> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| TimerError::NoRuntime)?,
        };

        let activation = {
            let mut control = self.shared.control();
            if control.state == TimerState::Running {
                return Ok(self);
            }
            control.state = TimerState::Running;
            control.activation += 1;
            control.started_at = Some(Instant::now());
            control.activation
        };

        #[cfg(feature = "logging")]
        debug!("Starting timer, activation {}.", activation);

        let path = ExecutionPath::new(Arc::clone(&self.shared), activation);
        let policy = Arc::clone(&self.policy);
        let handle = runtime.spawn(async move {
            policy.run(&path).await;
        });
        *lock(&self.handle) = Some(handle);

        Ok(self)
    }

    /// Requests the timer to stop without waiting for its task.
    ///
    /// An invocation already in progress runs to completion.
    pub fn stop(&self) -> &Self {
        self.shared.request_stop();
        self
    }

    /// Waits for the most recently started task to end.
    ///
    /// Resumes the panic if the callable panicked on that task. Never returns
    /// for a repeating timer that nobody stops.
    pub async fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
    }

    /// Gets the current state of the timer.
    pub fn state(&self) -> TimerState {
        self.shared.control().state
    }

    pub fn running(&self) -> bool {
        self.state() == TimerState::Running
    }

    pub fn stopped(&self) -> bool {
        self.state() == TimerState::Stopped
    }

    pub fn mode(&self) -> TimerMode {
        self.shared.control().mode
    }

    pub fn is_single_shot(&self) -> bool {
        self.mode() == TimerMode::SingleShot
    }

    /// Changes the execution policy, also while running.
    ///
    /// Switching a running repeating timer to single-shot lets it fire one
    /// more time before it stops.
    pub fn set_mode(&self, mode: TimerMode) -> &Self {
        self.shared.control().mode = mode;
        self
    }

    pub fn delay(&self) -> Duration {
        self.shared.control().delay
    }

    /// Alias of [`Timer::delay`].
    pub fn interval(&self) -> Duration {
        self.delay()
    }

    /// Changes the delay; a running timer uses it from its next wait on.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        self.shared.control().delay = delay;
        self
    }

    /// Returns a copy of the current callable.
    ///
    /// `None` while that callable is being invoked.
    pub fn callable(&self) -> Option<F>
    where
        F: Clone,
    {
        lock(&self.shared.callable).callable.clone()
    }

    /// Replaces the callable. Never waits for an invocation in progress; the
    /// replacement is used from the next invocation on.
    ///
    /// May be called from inside the callable itself.
    pub fn set_callable(&self, callable: F) -> &Self {
        drop(self.replace_callable(callable));
        self
    }

    /// Replaces the callable and returns the previous one.
    ///
    /// Returns `None` if the previous callable was being invoked; the execution
    /// path drops it once the call returns.
    pub fn replace_callable(&self, callable: F) -> Option<F> {
        lock(&self.shared.callable).replace(callable)
    }

    /// Runs `f` with exclusive access to the callable.
    ///
    /// Returns `None` without calling `f` while the callable is being invoked.
    /// `f` must not access the callable of this same timer.
    pub fn with_callable<R>(&self, f: impl FnOnce(&mut F) -> R) -> Option<R> {
        lock(&self.shared.callable).callable.as_mut().map(f)
    }

    /// Gets the timer's statistics.
    pub fn statistics(&self) -> TimerStatistics {
        lock(&self.shared.statistics).clone()
    }
}

impl<F, P> Drop for Timer<F, P> {
    fn drop(&mut self) {
        self.shared.request_stop();
    }
}

impl<F, P> fmt::Display for Timer<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.shared.control();
        write!(
            f,
            "Timer(mode: {:?}, delay: {:?}, state: {:?})",
            control.mode, control.delay, control.state
        )
    }
}

impl<F, P> fmt::Debug for Timer<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.shared.control();
        f.debug_struct("Timer")
            .field("mode", &control.mode)
            .field("delay", &control.delay)
            .field("state", &control.state)
            .field("activation", &control.activation)
            .finish_non_exhaustive()
    }
}
