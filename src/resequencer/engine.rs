/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Core resequencer engine.
//!
//! The engine owns the ordered buffer and the last-delivered marker behind a
//! single mutex. Producers call [`ResequencerEngine::insert`]; consumers call
//! [`ResequencerEngine::deliver`] or [`ResequencerEngine::deliver_next`] to
//! release whatever is eligible, in ascending order, to the delivery sink.
//!
//! An element is eligible once it has no armed timeout. Timeouts are armed
//! only for isolated elements: those that neither directly follow the last
//! delivered item nor have their immediate predecessor already buffered.
//! Delivery stops at the first element that is still waiting, so nothing
//! overtakes an element ordered before it.

use super::element::Element;
use super::sequence::Sequence;
use super::sink::{DeliverySink, SinkError};
use super::strategy::OrderingStrategy;
use super::timer::{Timeout, Timer, TimerError};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default time an isolated element waits for its predecessor.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Errors returned by the [`ResequencerEngine`].
#[derive(Debug, Error)]
pub enum ResequencerError {
    /// The ordering strategy does not accept the item.
    #[error("item is not valid for this resequencer")]
    InvalidItem,

    /// Reject-old is enabled and the item orders before the last delivered one.
    #[error("item orders before the last delivered item and was rejected")]
    RejectedItem,

    /// An item comparing equal is already buffered.
    #[error("an equal item is already buffered")]
    DuplicateItem,

    /// The item needs a timeout but the engine has not been started.
    #[error("resequencer is not started")]
    NotStarted,

    /// The timer failed to arm a timeout.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),

    /// The delivery sink failed. The item has already left the buffer.
    #[error("delivery failed: {0}")]
    Delivery(#[from] SinkError),
}

/// Buffer and last-delivered marker, guarded together.
struct EngineState<E, S> {
    /// Items not yet delivered, in strategy order.
    sequence: Sequence<E, S>,

    /// Most recently delivered item.
    last_delivered: Option<E>,
}

/// Online resequencer for items of type `E` ordered by strategy `S`.
///
/// All buffer mutations happen under one lock. Timeout callbacks touch only
/// the affected element's own timeout slot.
///
/// # Examples
///
/// ```
/// use resequencer::resequencer::{NaturalOrder, ResequencerEngine, SequenceNumberStrategy, SinkError};
/// use std::sync::{Arc, Mutex};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let delivered = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&delivered);
///
/// let engine: ResequencerEngine<u64, NaturalOrder> = ResequencerEngine::new(
///     SequenceNumberStrategy::natural(),
///     move |n: u64| -> Result<(), SinkError> {
///         sink.lock().map_err(|_| SinkError::Closed)?.push(n);
///         Ok(())
///     },
/// );
/// engine.start()?;
/// engine.set_last_delivered(Some(0));
///
/// engine.insert(2)?;
/// engine.insert(1)?;
/// assert_eq!(engine.deliver()?, 2);
/// assert_eq!(*delivered.lock().unwrap(), vec![1, 2]);
/// # Ok(())
/// # }
/// ```
pub struct ResequencerEngine<E, S> {
    /// Ordering shared with the buffer.
    strategy: Arc<S>,

    /// Buffer and last-delivered marker.
    state: Mutex<EngineState<E, S>>,

    /// Drives the timeouts of isolated elements.
    timer: Arc<Timer>,

    /// Timeout for newly armed elements, in milliseconds.
    timeout_ms: AtomicU64,

    /// Refuse items ordering before the last delivered one.
    reject_old: AtomicBool,

    /// Receives delivered items.
    sink: Box<dyn DeliverySink<E>>,
}

impl<E, S> ResequencerEngine<E, S>
where
    E: Clone + Send + Sync + 'static,
    S: OrderingStrategy<E>,
{
    /// Creates a stopped engine with the default timeout.
    #[must_use]
    pub fn new<K>(strategy: S, sink: K) -> Self
    where
        K: DeliverySink<E> + 'static,
    {
        let strategy = Arc::new(strategy);
        Self {
            state: Mutex::new(EngineState {
                sequence: Sequence::new(Arc::clone(&strategy)),
                last_delivered: None,
            }),
            strategy,
            timer: Arc::new(Timer::new()),
            timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT.as_millis() as u64),
            reject_old: AtomicBool::new(false),
            sink: Box::new(sink),
        }
    }

    /// Starts the timer on the current tokio runtime.
    ///
    /// On a restart, every buffered element still waiting on a timeout that
    /// [`stop`](Self::stop) aborted gets a fresh timeout of the current
    /// duration.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self) -> Result<(), ResequencerError> {
        let state = self.lock();
        let restarting = !self.timer.is_running();
        self.timer.start()?;

        if restarting {
            let mut rearmed = 0usize;
            for element in state.sequence.elements() {
                if element.scheduled() {
                    let timeout = Arc::new(Timeout::new(Arc::clone(&self.timer), self.timeout()));
                    element.schedule(timeout)?;
                    rearmed += 1;
                }
            }
            if rearmed > 0 {
                debug!(rearmed, "timeouts re-armed after restart");
            }
        }

        debug!("resequencer started");
        Ok(())
    }

    /// Stops the timer, aborting every pending timeout. Buffered items stay
    /// buffered and are not delivered; elements that were waiting keep
    /// waiting until the next [`start`](Self::start) re-arms them.
    pub fn stop(&self) {
        self.timer.stop();
        debug!(buffered = self.size(), "resequencer stopped");
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.timer.is_running()
    }

    /// The ordering strategy.
    #[must_use]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// How long an isolated element waits before becoming eligible.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(AtomicOrdering::Relaxed))
    }

    /// Sets the timeout used for elements inserted from now on.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, AtomicOrdering::Relaxed);
    }

    /// Whether items older than the last delivered item are rejected.
    #[must_use]
    pub fn is_reject_old(&self) -> bool {
        self.reject_old.load(AtomicOrdering::Relaxed)
    }

    /// Enables or disables rejection of old items.
    pub fn set_reject_old(&self, reject_old: bool) {
        self.reject_old.store(reject_old, AtomicOrdering::Relaxed);
    }

    /// Number of buffered, not yet delivered items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().sequence.len()
    }

    /// The most recently delivered item.
    #[must_use]
    pub fn last_delivered(&self) -> Option<E> {
        self.lock().last_delivered.clone()
    }

    /// Overrides the last delivered item, e.g. to resume a stream at a known
    /// position.
    pub fn set_last_delivered(&self, item: Option<E>) {
        self.lock().last_delivered = item;
    }

    /// Number of timeouts currently pending on the timer.
    #[must_use]
    pub fn pending_timeouts(&self) -> usize {
        self.timer.pending()
    }

    /// Buffers `item`.
    ///
    /// Cancels the timeout of the item's buffered successor, if any, and arms
    /// a timeout for `item` itself when it has no known neighbour.
    ///
    /// # Errors
    ///
    /// All of these leave the engine untouched:
    /// - [`ResequencerError::InvalidItem`] if the strategy rejects the item
    /// - [`ResequencerError::RejectedItem`] if reject-old is on and the item
    ///   orders before the last delivered one
    /// - [`ResequencerError::DuplicateItem`] if an equal item is buffered
    /// - [`ResequencerError::NotStarted`] if a timeout is needed but the
    ///   engine is stopped
    pub fn insert(&self, item: E) -> Result<(), ResequencerError> {
        let element = Arc::new(Element::new(item));
        if !self.strategy.is_valid(element.item()) {
            trace!("invalid item refused");
            return Err(ResequencerError::InvalidItem);
        }

        let state = self.lock();

        if self.is_reject_old()
            && state.last_delivered.as_ref().is_some_and(|last| {
                self.strategy.compare(element.item(), last) == Ordering::Less
            })
        {
            debug!("item older than last delivered rejected");
            return Err(ResequencerError::RejectedItem);
        }

        if state.sequence.contains(&element) {
            return Err(ResequencerError::DuplicateItem);
        }

        let follows_last_delivered = state
            .last_delivered
            .as_ref()
            .is_some_and(|last| self.strategy.is_successor(element.item(), last));
        // Adjacency to any buffered predecessor is treated as enough, even
        // when that predecessor is itself still waiting.
        let needs_timeout =
            !follows_last_delivered && state.sequence.predecessor(&element).is_none();

        if needs_timeout && !self.timer.is_running() {
            return Err(ResequencerError::NotStarted);
        }

        state.sequence.insert(Arc::clone(&element));

        if let Some(successor) = state.sequence.successor(&element) {
            successor.cancel();
            trace!("successor released by arriving predecessor");
        }

        if needs_timeout {
            let timeout = Arc::new(Timeout::new(Arc::clone(&self.timer), self.timeout()));
            if let Err(e) = element.schedule(timeout) {
                state.sequence.remove(&element);
                return Err(e.into());
            }
            trace!(
                timeout_ms = self.timeout_ms.load(AtomicOrdering::Relaxed),
                "timeout armed for isolated item"
            );
        }

        trace!(buffered = state.sequence.len(), "item buffered");
        Ok(())
    }

    /// Delivers the smallest buffered item if it is no longer waiting.
    ///
    /// Returns `Ok(false)` when the buffer is empty or its smallest item still
    /// has an armed timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ResequencerError::Delivery`] if the sink fails. The item has
    /// already been removed and recorded as last delivered at that point; it
    /// is not redelivered.
    pub fn deliver_next(&self) -> Result<bool, ResequencerError> {
        let mut state = self.lock();

        let Some(head) = state.sequence.first() else {
            return Ok(false);
        };
        if head.scheduled() {
            return Ok(false);
        }

        state.sequence.remove(&head);
        let item = head.item().clone();
        state.last_delivered = Some(item.clone());

        if let Err(e) = self.sink.send_item(item) {
            warn!(error = %e, "delivery sink failed; item dropped");
            return Err(e.into());
        }
        Ok(true)
    }

    /// Delivers every eligible item in order. Returns how many were delivered.
    ///
    /// # Errors
    ///
    /// Stops at the first sink failure; see [`deliver_next`](Self::deliver_next).
    pub fn deliver(&self) -> Result<usize, ResequencerError> {
        let mut delivered = 0;
        while self.deliver_next()? {
            delivered += 1;
        }
        if delivered > 0 {
            trace!(delivered, "delivery pass complete");
        }
        Ok(delivered)
    }

    /// Snapshot of buffered items in ascending order.
    #[must_use]
    pub fn buffered(&self) -> Vec<E> {
        self.lock()
            .sequence
            .elements()
            .iter()
            .map(|element| element.item().clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState<E, S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E, S> Drop for ResequencerEngine<E, S> {
    fn drop(&mut self) {
        self.timer.stop();
    }
}
