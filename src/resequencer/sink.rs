/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Delivery sinks.
//!
//! A [`DeliverySink`] receives items from the engine in resolved order. Any
//! `Fn(E) -> Result<(), SinkError>` closure is a direct, synchronous sink.
//! [`QueueSink`] decouples the engine from a slow consumer: items go onto a
//! bounded channel drained by a dedicated worker task that forwards each one
//! to an [`ItemProcessor`].

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors raised while handing an item downstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The delivery queue has no free slot.
    #[error("delivery queue is full")]
    QueueFull,

    /// The delivery queue or its worker is gone.
    #[error("delivery queue is closed")]
    Closed,

    /// The downstream consumer refused the item.
    #[error("item rejected downstream: {reason}")]
    Rejected {
        /// Why the item was refused.
        reason: String,
    },
}

/// Downstream hand-off for resequenced items.
pub trait DeliverySink<E>: Send + Sync {
    /// Hands `item` to the downstream consumer.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the item could not be handed off.
    fn send_item(&self, item: E) -> Result<(), SinkError>;
}

impl<E, F> DeliverySink<E> for F
where
    F: Fn(E) -> Result<(), SinkError> + Send + Sync,
{
    fn send_item(&self, item: E) -> Result<(), SinkError> {
        self(item)
    }
}

/// Downstream processor driven by a [`QueueSink`] worker.
pub trait ItemProcessor<E>: Send + 'static {
    /// Processes one item. Errors are logged; the worker keeps going.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the item could not be processed.
    fn process(&mut self, item: E) -> Result<(), SinkError>;
}

impl<E, F> ItemProcessor<E> for F
where
    F: FnMut(E) -> Result<(), SinkError> + Send + 'static,
{
    fn process(&mut self, item: E) -> Result<(), SinkError> {
        self(item)
    }
}

/// Message carried on the delivery queue.
#[derive(Debug)]
pub enum SinkMessage<E> {
    /// An item to process.
    Item(E),
    /// Reserved sentinel: the worker finishes once it reaches this message.
    Shutdown,
}

/// Counters reported by a finished [`SinkWorker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Items processed successfully.
    pub processed: u64,
    /// Items whose processing failed.
    pub failed: u64,
}

/// Sink that queues items for a dedicated worker task.
///
/// # Examples
///
/// ```
/// use resequencer::resequencer::{DeliverySink, QueueSink, SinkError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (sink, worker) = QueueSink::<u64>::spawn(16, |item: u64| -> Result<(), SinkError> {
///     println!("processing {item}");
///     Ok(())
/// });
///
/// sink.send_item(1)?;
/// sink.close().await?;
/// let summary = worker.join().await?;
/// assert_eq!(summary.processed, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueueSink<E> {
    /// Bounded queue feeding the worker.
    tx: mpsc::Sender<SinkMessage<E>>,
}

impl<E> Clone for QueueSink<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> QueueSink<E> {
    /// Creates a queue of `capacity` slots and spawns its worker on the
    /// current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or if called outside a tokio runtime.
    #[must_use]
    pub fn spawn<P>(capacity: usize, processor: P) -> (Self, SinkWorker)
    where
        P: ItemProcessor<E>,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_worker(rx, processor));
        (Self { tx }, SinkWorker { handle })
    }

    /// Enqueues the shutdown sentinel, waiting for a free slot. Items queued
    /// before it are still processed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Closed`] if the worker is already gone.
    pub async fn close(&self) -> Result<(), SinkError> {
        self.tx
            .send(SinkMessage::Shutdown)
            .await
            .map_err(|_| SinkError::Closed)
    }

    /// Free slots left in the queue.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

impl<E: Send + 'static> DeliverySink<E> for QueueSink<E> {
    fn send_item(&self, item: E) -> Result<(), SinkError> {
        self.tx
            .try_send(SinkMessage::Item(item))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::QueueFull,
                TrySendError::Closed(_) => SinkError::Closed,
            })
    }
}

/// Handle to the worker task draining a [`QueueSink`].
#[derive(Debug)]
pub struct SinkWorker {
    /// The worker task.
    handle: JoinHandle<WorkerSummary>,
}

impl SinkWorker {
    /// Waits for the worker to finish and returns its counters.
    ///
    /// # Errors
    ///
    /// Returns the task's join error if it was cancelled or panicked.
    pub async fn join(self) -> Result<WorkerSummary, tokio::task::JoinError> {
        self.handle.await
    }

    /// Cancels the worker without draining the queue.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the worker has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run_worker<E, P>(mut rx: mpsc::Receiver<SinkMessage<E>>, mut processor: P) -> WorkerSummary
where
    P: ItemProcessor<E>,
{
    let mut summary = WorkerSummary::default();
    debug!("sink worker started");

    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Item(item) => match processor.process(item) {
                Ok(()) => summary.processed += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(error = %e, "item processing failed");
                }
            },
            SinkMessage::Shutdown => break,
        }
    }

    debug!(
        processed = summary.processed,
        failed = summary.failed,
        "sink worker stopped"
    );
    summary
}
