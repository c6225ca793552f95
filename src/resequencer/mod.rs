/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Stream resequencer.
//!
//! This module restores the logical order of items that arrive out of order
//! from an unbounded stream, without ever collecting the whole stream. Items
//! are buffered in an ordered skip list; each one is released as soon as
//! nothing ordered before it can still be waiting.
//!
//! # Architecture
//!
//! - An [`OrderingStrategy`] supplies the total order and adjacency predicates
//! - Each buffered item is an [`Element`] with at most one armed [`Timeout`]
//! - An isolated item (no known neighbour) waits at most the configured
//!   timeout before it stops blocking later items
//! - The [`ResequencerEngine`] serializes inserts and deliveries on one lock
//! - Delivered items go to a [`DeliverySink`], either a plain closure or a
//!   [`QueueSink`] drained by its own worker task
//! - A [`StreamResequencer`] adds capacity back-pressure and a background
//!   delivery loop
//!
//! # Examples
//!
//! ```no_run
//! use resequencer::resequencer::{
//!     NaturalOrder, QueueSink, ResequencerConfig, ResequencerEngine, SequenceNumberStrategy,
//!     SinkError, StreamResequencer,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, worker) = QueueSink::<u64>::spawn(1024, |n: u64| -> Result<(), SinkError> {
//!     println!("in order: {n}");
//!     Ok(())
//! });
//!
//! let engine: ResequencerEngine<u64, NaturalOrder> =
//!     ResequencerEngine::new(SequenceNumberStrategy::natural(), sink.clone());
//! let config = ResequencerConfig::from_json(r#"{ "timeout_ms": 500 }"#)?;
//! let stream = StreamResequencer::new(engine, &config)?;
//! let handle = stream.start()?;
//!
//! for n in [3, 1, 2] {
//!     stream.insert(n).await?;
//! }
//!
//! handle.shutdown().await?;
//! sink.close().await?;
//! worker.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod element;
pub mod engine;
pub mod sequence;
pub mod sink;
pub mod strategy;
pub mod stream;
pub mod timer;

#[cfg(test)]
mod tests;

// Re-export main types
pub use config::{ConfigError, ResequencerConfig};
pub use element::Element;
pub use engine::{DEFAULT_TIMEOUT, ResequencerEngine, ResequencerError};
pub use sequence::Sequence;
pub use sink::{DeliverySink, ItemProcessor, QueueSink, SinkError, SinkMessage, SinkWorker, WorkerSummary};
pub use strategy::{NaturalOrder, OrderingStrategy, SequenceNumberStrategy};
pub use stream::{StreamHandle, StreamResequencer};
pub use timer::{Timeout, TimeoutListener, TimeoutState, Timer, TimerError};
