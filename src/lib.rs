/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # resequencer-rs
//!
//! An online stream resequencer. Items arriving out of order are buffered and
//! released downstream in their logical order. How long a gap may hold back
//! the stream is bounded by a per-item timeout, so a lost item delays its
//! successors but never stalls them forever.
//!
//! The ordering is pluggable through [`OrderingStrategy`]; the crate never
//! looks inside an item.
//!
//! ## Quick start
//!
//! ```
//! use resequencer::{NaturalOrder, ResequencerEngine, SequenceNumberStrategy, SinkError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine: ResequencerEngine<u64, NaturalOrder> = ResequencerEngine::new(
//!     SequenceNumberStrategy::natural(),
//!     |n: u64| -> Result<(), SinkError> {
//!         println!("{n}");
//!         Ok(())
//!     },
//! );
//! engine.start()?;
//! engine.set_last_delivered(Some(0));
//!
//! engine.insert(3)?;
//! engine.insert(1)?;
//! assert_eq!(engine.deliver()?, 1);
//! assert_eq!(engine.size(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`resequencer`]: engine, ordered buffer, timeouts, sinks and the async
//!   stream driver

pub mod resequencer;

pub use resequencer::{
    ConfigError, DeliverySink, NaturalOrder, OrderingStrategy, QueueSink, ResequencerConfig,
    ResequencerEngine, ResequencerError, SequenceNumberStrategy, SinkError, StreamHandle,
    StreamResequencer,
};
