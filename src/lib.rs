//! Streaming protocol decoders for logic-analyzer captures
//!
//! Decoders turn sampled line levels (or pre-framed SPI transfers) into an
//! ordered stream of [`Annotation`]s: bits, bytes, protocol fields, decoded
//! commands and warnings, each tagged with the sample range it covers.
//!
//! # Decoders
//!
//! - [`HvspDecoder`]: AVR high-voltage serial programming (clock + 3 data lines)
//! - [`UpdiDecoder`]: AVR UPDI one-wire bus with baud recovery from the sync byte
//! - [`Mcp23s17Decoder`]: MCP23S17 GPIO expander register accesses over SPI
//! - [`Max7219Decoder`]: MAX7219/MAX7221 LED driver register writes over SPI
//!
//! Every decoder can be driven directly through a [`Source`]/[`Sink`] pair
//! (a `VecDeque` in, a `Vec` out), or added to a [`Pipeline`] where each
//! node runs on its own thread.
//!
//! # Example
//!
//! ```no_run
//! use dsl::{AnnotationCollector, Pipeline, ReplaySource, Sample, UpdiDecoder};
//!
//! let samples = vec![Sample::new(true, 0)];
//! let collector = AnnotationCollector::new();
//! let annotations = collector.handle();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("line", ReplaySource::new(samples))?;
//! pipeline.add_process("updi", UpdiDecoder::new().with_samplerate(1_000_000))?;
//! pipeline.add_process("out", collector)?;
//! pipeline.connect("line", "out", "updi", "updi")?;
//! pipeline.connect("updi", "annotations", "out", "annotations")?;
//! pipeline.build()?.wait()?;
//!
//! for ann in annotations.lock().unwrap().iter() {
//!     println!("{}", ann);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export decoder data types
pub use nodes::decoders::{Annotation, AnnotationKind, SpiPacket, SpiWord};

// Re-export decoders
pub use nodes::decoders::{
    DeviceContext, HvspConfig, HvspDecoder, Max7219Decoder, Mcp23s17Config, Mcp23s17Decoder,
    UpdiConfig, UpdiDecoder, UpdiStats,
};

// Re-export helper nodes
pub use nodes::{AnnotationCollector, ReplaySource};

// Re-export streaming runtime components
pub use runtime::{
    ChannelMerger, ConnectionError, InputPort, LogicSample, OutputPort, Pipeline, PipelineError,
    PortDirection, PortSchema, ProcessNode, Sample, Scheduler, Sink, Source, WorkError,
    WorkResult, register_type,
};

/// Errors that stop a decoder
///
/// Protocol violations in the captured traffic are reported as warning
/// annotations instead; these are the conditions a decoder cannot continue
/// from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Cannot decode without samplerate")]
    MissingSampleRate,

    #[error("{field}: size selector {selector} too large")]
    UnsupportedWidth { field: &'static str, selector: u8 },

    #[error("{field} contains non-ASCII bytes")]
    NonAscii { field: &'static str },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
