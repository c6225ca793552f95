/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Shared time-keeping facility and one-shot cancellable timeouts.
//!
//! A [`Timer`] runs each armed [`Timeout`] as a task on a tokio runtime. The
//! timer keeps an abort handle for every pending task so that a single
//! [`Timer::stop`] call cancels everything still waiting.
//!
//! A [`Timeout`] moves through `Idle -> Armed -> {Fired | Cancelled}` exactly
//! once. Listeners run synchronously on the timer task when it fires, in
//! registration order.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Errors raised by the [`Timer`] and [`Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// `start` was called outside of a tokio runtime.
    #[error("no tokio runtime available to drive the timer")]
    NoRuntime,

    /// The timer has not been started, or has been stopped.
    #[error("timer is not running")]
    NotRunning,

    /// The timeout was already armed once and cannot be armed again.
    #[error("timeout has already been scheduled")]
    AlreadyScheduled,
}

/// Shared time-keeping facility backing all timeouts of one engine.
#[derive(Debug, Default)]
pub struct Timer {
    /// Runtime the timeout tasks run on; `None` while stopped.
    runtime: Mutex<Option<Handle>>,

    /// Abort handles of tasks that have not fired yet, by task id.
    pending: Arc<DashMap<u64, AbortHandle>>,

    /// Last task id handed out. Ids start at 1.
    next_id: AtomicU64,
}

impl Timer {
    /// Creates a stopped timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the timer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NoRuntime`] when called outside a runtime.
    pub fn start(&self) -> Result<(), TimerError> {
        let handle = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        self.start_on(handle);
        Ok(())
    }

    /// Starts the timer on an explicit runtime handle.
    pub fn start_on(&self, handle: Handle) {
        *self.runtime.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("timer started");
    }

    /// Stops the timer and aborts every pending timeout.
    ///
    /// Aborted timeouts never fire and keep reporting
    /// [`TimeoutState::Armed`]; whoever owns them re-arms a fresh
    /// [`Timeout`] after the next start.
    pub fn stop(&self) {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut aborted = 0usize;
        for id in ids {
            if let Some((_, task)) = self.pending.remove(&id) {
                task.abort();
                aborted += 1;
            }
        }
        debug!(aborted, "timer stopped");
    }

    /// Returns `true` while the timer accepts new timeouts.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of timeouts currently waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Runs `task` once `delay` has elapsed. Returns an id usable with
    /// [`Timer::cancel`].
    fn schedule<F>(&self, delay: Duration, task: F) -> Result<u64, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TimerError::NotRunning)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = tokio::time::Instant::now() + delay;
        let pending = Arc::clone(&self.pending);

        // Held until the abort handle is registered.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let join = handle.spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            tokio::time::sleep_until(deadline).await;
            task();
            pending.remove(&id);
        });

        self.pending.insert(id, join.abort_handle());
        let _ = registered_tx.send(());
        Ok(id)
    }

    /// Aborts the pending task `id`. Returns `false` if it already ran or was
    /// never registered.
    fn cancel(&self, id: u64) -> bool {
        match self.pending.remove(&id) {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// Callback invoked when a [`Timeout`] fires.
pub trait TimeoutListener: Send + Sync {
    /// Called once, on the timer task, when `timeout` fires.
    fn on_timeout(&self, timeout: &Timeout);
}

impl<F> TimeoutListener for F
where
    F: Fn(&Timeout) + Send + Sync,
{
    fn on_timeout(&self, timeout: &Timeout) {
        self(timeout)
    }
}

/// Lifecycle state of a [`Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeoutState {
    /// Created, not yet scheduled.
    Idle = 0,
    /// Waiting on the timer.
    Armed = 1,
    /// Listeners have been notified.
    Fired = 2,
    /// Cancelled before firing.
    Cancelled = 3,
}

impl TimeoutState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Armed,
            2 => Self::Fired,
            3 => Self::Cancelled,
            _ => Self::Idle,
        }
    }
}

/// One-shot, cancellable delayed callback.
///
/// # Examples
///
/// ```
/// use resequencer::resequencer::{Timeout, TimeoutState, Timer};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let timer = Arc::new(Timer::new());
/// timer.start()?;
///
/// let timeout = Arc::new(Timeout::new(Arc::clone(&timer), Duration::from_secs(5)));
/// timeout.schedule()?;
/// assert!(timeout.cancel());
/// assert_eq!(timeout.state(), TimeoutState::Cancelled);
/// # Ok(())
/// # }
/// ```
pub struct Timeout {
    /// Timer this timeout is armed on.
    timer: Arc<Timer>,

    /// Delay between scheduling and firing.
    duration: Duration,

    /// A [`TimeoutState`] discriminant.
    state: AtomicU8,

    /// Timer task id once armed, 0 before.
    task: AtomicU64,

    /// Called in registration order when the timeout fires.
    listeners: Mutex<Vec<Arc<dyn TimeoutListener>>>,
}

impl Timeout {
    /// Creates an idle timeout that will fire `duration` after being scheduled.
    #[must_use]
    pub fn new(timer: Arc<Timer>, duration: Duration) -> Self {
        Self {
            timer,
            duration,
            state: AtomicU8::new(TimeoutState::Idle as u8),
            task: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Configured delay.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TimeoutState {
        TimeoutState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while scheduled and neither fired nor cancelled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state() == TimeoutState::Armed
    }

    /// Appends a listener. Listeners added after firing are never called.
    pub fn add_listener(&self, listener: Arc<dyn TimeoutListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Removes every registered listener.
    pub fn clear_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Arms the timeout on its timer.
    ///
    /// # Errors
    ///
    /// - [`TimerError::AlreadyScheduled`] if this instance was armed before
    /// - [`TimerError::NotRunning`] if the timer is stopped; the timeout
    ///   stays idle
    pub fn schedule(self: &Arc<Self>) -> Result<(), TimerError> {
        self.state
            .compare_exchange(
                TimeoutState::Idle as u8,
                TimeoutState::Armed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TimerError::AlreadyScheduled)?;

        let this = Arc::clone(self);
        match self.timer.schedule(self.duration, move || this.fire()) {
            Ok(task) => {
                self.task.store(task, Ordering::Release);
                trace!(task, delay_ms = self.duration.as_millis() as u64, "timeout armed");
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(TimeoutState::Idle as u8, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Cancels an armed timeout. Returns `false` if it was not armed.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(
                TimeoutState::Armed as u8,
                TimeoutState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if cancelled {
            let task = self.task.load(Ordering::Acquire);
            if task != 0 {
                self.timer.cancel(task);
            }
            trace!(task, "timeout cancelled");
        }
        cancelled
    }

    fn fire(&self) {
        if self
            .state
            .compare_exchange(
                TimeoutState::Armed as u8,
                TimeoutState::Fired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let listeners: Vec<Arc<dyn TimeoutListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        trace!(listeners = listeners.len(), "timeout fired");
        for listener in &listeners {
            listener.on_timeout(self);
        }
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("duration", &self.duration)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
