//! Protocol decoder nodes
//!
//! Decoders for live data processing using the channel-based architecture.
//! Line-level decoders take [`Sample`](crate::runtime::Sample) streams; the
//! SPI register decoders take already framed [`SpiPacket`]s.

pub mod avr_hvsp;
pub mod avr_updi;
pub mod max7219;
pub mod mcp23s17;
pub mod types;

// Re-export common types
pub use types::{Annotation, AnnotationKind, SpiPacket, SpiWord, WARNINGS};

// Re-export decoders
pub use avr_hvsp::{Command as HvspCommand, DeviceContext, HvspConfig, HvspDecoder};
pub use avr_updi::{Opcode, SystemInfo, UpdiConfig, UpdiDecoder, UpdiStats};
pub use max7219::Max7219Decoder;
pub use mcp23s17::{Mcp23s17Config, Mcp23s17Decoder};
