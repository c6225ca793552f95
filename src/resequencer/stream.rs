/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Async stream driver around a [`ResequencerEngine`].
//!
//! Producers await [`StreamResequencer::insert`], which waits while the buffer
//! is at capacity. A background delivery loop drains the engine whenever an
//! insertion signals it, and otherwise every delivery attempt interval so
//! that items released by a fired timeout are picked up.

use super::config::{ConfigError, ResequencerConfig};
use super::engine::{ResequencerEngine, ResequencerError};
use super::strategy::OrderingStrategy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Capacity-bounded, self-delivering resequencer stream.
///
/// Cloning yields another producer handle onto the same engine.
///
/// # Examples
///
/// ```no_run
/// use resequencer::resequencer::{
///     NaturalOrder, ResequencerConfig, ResequencerEngine, SequenceNumberStrategy, SinkError,
///     StreamResequencer,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine: ResequencerEngine<u64, NaturalOrder> = ResequencerEngine::new(
///     SequenceNumberStrategy::natural(),
///     |n: u64| -> Result<(), SinkError> {
///         println!("delivered {n}");
///         Ok(())
///     },
/// );
/// let stream = StreamResequencer::new(engine, &ResequencerConfig::default())?;
/// let handle = stream.start()?;
///
/// stream.insert(2).await?;
/// stream.insert(1).await?;
///
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamResequencer<E, S> {
    /// Engine shared with the delivery loop.
    engine: Arc<ResequencerEngine<E, S>>,

    /// Buffered items allowed before producers wait.
    capacity: usize,

    /// Swallow [`ResequencerError::InvalidItem`] instead of returning it.
    ignore_invalid: bool,

    /// Longest pause between two delivery attempts.
    delivery_attempt_interval: Duration,

    /// Wakes the delivery loop after a successful insert.
    delivery_signal: Arc<Notify>,

    /// Wakes producers waiting for buffer space.
    space: Arc<Notify>,

    /// `true` once the delivery loop has been shut down.
    shutdown: Arc<watch::Sender<bool>>,
}

impl<E, S> Clone for StreamResequencer<E, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            capacity: self.capacity,
            ignore_invalid: self.ignore_invalid,
            delivery_attempt_interval: self.delivery_attempt_interval,
            delivery_signal: Arc::clone(&self.delivery_signal),
            space: Arc::clone(&self.space),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<E, S> StreamResequencer<E, S>
where
    E: Clone + Send + Sync + 'static,
    S: OrderingStrategy<E>,
{
    /// Wraps `engine`, applying the timeout and reject-old settings of
    /// `config` to it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` does not validate.
    pub fn new(engine: ResequencerEngine<E, S>, config: &ResequencerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        engine.set_timeout(config.timeout());
        engine.set_reject_old(config.reject_old);

        Ok(Self {
            engine: Arc::new(engine),
            capacity: config.capacity,
            ignore_invalid: config.ignore_invalid,
            delivery_attempt_interval: config.delivery_attempt_interval(),
            delivery_signal: Arc::new(Notify::new()),
            space: Arc::new(Notify::new()),
            shutdown: Arc::new(watch::Sender::new(false)),
        })
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &ResequencerEngine<E, S> {
        &self.engine
    }

    /// Buffered items allowed before producers wait.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts `item`, first waiting until the buffer is below capacity.
    ///
    /// Concurrent producers may each pass the capacity check before either
    /// inserts, so the buffer can briefly exceed capacity by the number of
    /// racing producers.
    ///
    /// # Errors
    ///
    /// - [`ResequencerError::NotStarted`] once the stream has been shut down,
    ///   including for producers that were waiting for space at that point
    /// - any other [`ResequencerError`] from [`ResequencerEngine::insert`],
    ///   except [`ResequencerError::InvalidItem`] when invalid items are
    ///   ignored
    pub async fn insert(&self, item: E) -> Result<(), ResequencerError> {
        self.wait_for_space().await?;

        match self.engine.insert(item) {
            Ok(()) => {
                self.delivery_signal.notify_one();
                Ok(())
            }
            Err(ResequencerError::InvalidItem) if self.ignore_invalid => {
                debug!("invalid item ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Starts the engine and spawns the delivery loop on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine's timer cannot start.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) -> Result<StreamHandle, ResequencerError> {
        self.engine.start()?;
        self.shutdown.send_replace(false);

        let handle = tokio::spawn(run_delivery_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.delivery_signal),
            Arc::clone(&self.space),
            self.delivery_attempt_interval,
            self.shutdown.subscribe(),
        ));

        Ok(StreamHandle {
            shutdown: Arc::clone(&self.shutdown),
            handle,
        })
    }

    async fn wait_for_space(&self) -> Result<(), ResequencerError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if *shutdown.borrow_and_update() {
                return Err(ResequencerError::NotStarted);
            }
            if self.engine.size() < self.capacity {
                return Ok(());
            }
            trace!(capacity = self.capacity, "buffer full, producer waiting");
            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

/// Handle to a running delivery loop.
///
/// Dropping the handle detaches the loop; call [`StreamHandle::shutdown`] to
/// stop it.
pub struct StreamHandle {
    /// Shutdown flag shared with the stream and its producers.
    shutdown: Arc<watch::Sender<bool>>,

    /// The delivery loop task.
    handle: JoinHandle<()>,
}

impl StreamHandle {
    /// Stops the delivery loop and the engine's timer, then waits for the loop
    /// to exit. Buffered items are not flushed. Producers waiting for space
    /// are woken and fail with [`ResequencerError::NotStarted`].
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.shutdown.send_replace(true);
        self.handle.await
    }

    /// Returns `true` once the delivery loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_delivery_loop<E, S>(
    engine: Arc<ResequencerEngine<E, S>>,
    signal: Arc<Notify>,
    space: Arc<Notify>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Clone + Send + Sync + 'static,
    S: OrderingStrategy<E>,
{
    debug!(interval_ms = interval.as_millis() as u64, "delivery loop started");

    loop {
        tokio::select! {
            _ = signal.notified() => {}
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stopped| *stopped) => break,
        }

        let delivered = drain(&engine);
        if delivered > 0 {
            trace!(delivered, buffered = engine.size(), "delivery attempt");
        }
        space.notify_waiters();
    }

    engine.stop();
    space.notify_waiters();
    debug!("delivery loop stopped");
}

/// Delivers everything eligible, skipping past items the sink refuses.
fn drain<E, S>(engine: &ResequencerEngine<E, S>) -> usize
where
    E: Clone + Send + Sync + 'static,
    S: OrderingStrategy<E>,
{
    let mut attempted = 0;
    loop {
        match engine.deliver() {
            Ok(delivered) => return attempted + delivered,
            Err(e) => {
                attempted += 1;
                warn!(error = %e, "delivery failed, continuing with next item");
            }
        }
    }
}
