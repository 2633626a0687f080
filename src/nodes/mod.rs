//! Node-based signal processing system
//!
//! - **Decoders**: Protocol decoders (AVR HVSP, AVR UPDI, MCP23S17, MAX7219)
//! - **Replay**: Source node that feeds a recorded stream into a pipeline
//! - **Collector**: Sink node that gathers annotations for the caller
//!
//! # Architecture
//!
//! The streaming architecture uses thread-per-node execution:
//! - Source nodes produce samples
//! - Process nodes transform data (decoders)
//! - Sink nodes consume results
//! - All connected via crossbeam MPSC channels

mod collector;
pub mod decoders;
mod replay;

pub use collector::AnnotationCollector;
pub use replay::ReplaySource;

// Re-export Sample from runtime
pub use crate::runtime::Sample;
