//! MCP23S17 16-bit GPIO expander decoder
//!
//! Interprets SPI transfers: the first MOSI byte selects the device and the
//! direction, the second is the starting register, and the remaining bytes
//! are consecutive register values (written on MOSI, read on MISO). Register
//! names follow the IOCON.BANK=0 layout, where A/B registers interleave.

use super::types::{Annotation, AnnotationKind, SpiPacket, SpiWord};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::stream::{Sink, Source};
use std::collections::VecDeque;
use tracing::trace;

/// Register names by address with IOCON.BANK=0
const REGISTERS: [&str; 22] = [
    "IODIRA", "IODIRB", "IPOLA", "IPOLB", "GPINTENA", "GPINTENB", "DEFVALA", "DEFVALB",
    "INTCONA", "INTCONB", "IOCON", "IOCON", "GPPUA", "GPPUB", "INTFA", "INTFB", "INTCAPA",
    "INTCAPB", "GPIOA", "GPIOB", "OLATA", "OLATB",
];

pub fn register_name(address: usize) -> Option<&'static str> {
    REGISTERS.get(address).copied()
}

/// Register name without its port suffix, for merged 16-bit values
fn pair_name(name: &str) -> &str {
    name.strip_suffix('A')
        .or_else(|| name.strip_suffix('B'))
        .unwrap_or(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mcp23s17Config {
    /// Show A/B register pairs as one little-endian 16-bit value
    pub merge_pairs: bool,
}

/// MCP23S17 decoder node
///
/// Input: SpiPacket events
/// Output: Annotation events
pub struct Mcp23s17Decoder {
    name: String,
    config: Mcp23s17Config,
    buffer: VecDeque<SpiPacket>,
}

impl Mcp23s17Decoder {
    pub fn new() -> Self {
        Self {
            name: "mcp23s17".to_string(),
            config: Mcp23s17Config::default(),
            buffer: VecDeque::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: Mcp23s17Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_merge_pairs(mut self, merge: bool) -> Self {
        self.config.merge_pairs = merge;
        self
    }

    /// Decode every packet from `source` until it is exhausted
    pub fn decode<S, K>(&mut self, source: &mut S, out: &mut K) -> WorkResult
    where
        S: Source<SpiPacket>,
        K: Sink<Annotation>,
    {
        loop {
            let packet = match source.recv() {
                Ok(packet) => packet,
                Err(WorkError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            };
            self.feed(&packet, out)?;
        }
    }

    /// Decode one packet; anything but a transfer is ignored
    pub fn feed<K: Sink<Annotation>>(&mut self, packet: &SpiPacket, out: &mut K) -> WorkResult {
        let SpiPacket::Transfer { mosi, miso } = packet else {
            return Ok(());
        };
        let Some(select) = mosi.first() else {
            return Ok(());
        };

        let device = select.value >> 1;
        let read = select.value & 1 == 1;
        let direction = if read { "read" } else { "write" };
        out.emit(field(
            "select",
            select.start_time,
            select.end_time,
            format!("Select {:02X} for {}", device, direction),
        ))?;

        let Some(address) = mosi.get(1) else {
            return Ok(());
        };
        out.emit(field(
            "addr",
            address.start_time,
            address.end_time,
            format!("Address {:02X}", address.value),
        ))?;

        let values = if read { miso } else { mosi };
        let values = values.get(2..).unwrap_or_default();
        trace!("[{}] {} {} bytes from {:02X}", self.name, direction, values.len(), address.value);
        self.walk(usize::from(address.value), values, out)
    }

    /// Annotate consecutive register values starting at `addr`.
    ///
    /// The address keeps counting past the register file, so one transfer
    /// may be as long as the capture.
    fn walk<K: Sink<Annotation>>(&self, mut addr: usize, values: &[SpiWord], out: &mut K) -> WorkResult {
        let mut idx = 0;
        while let Some(value) = values.get(idx) {
            let Some(name) = register_name(addr) else {
                out.emit(Annotation::warning(
                    value.start_time,
                    value.end_time,
                    format!("Unknown register {:02X}", addr),
                ))?;
                idx += 1;
                addr += 1;
                continue;
            };

            match values.get(idx + 1) {
                Some(high) if self.config.merge_pairs && addr % 2 == 0 => {
                    let merged = u16::from_le_bytes([value.value, high.value]);
                    out.emit(field(
                        "value",
                        value.start_time,
                        high.end_time,
                        format!("{}: {:04X}", pair_name(name), merged),
                    ))?;
                    idx += 2;
                    addr += 2;
                }
                _ => {
                    out.emit(field(
                        "value",
                        value.start_time,
                        value.end_time,
                        format!("{}: {:02X}", name, value.value),
                    ))?;
                    idx += 1;
                    addr += 1;
                }
            }
        }
        Ok(())
    }
}

impl Default for Mcp23s17Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn field(class: &'static str, start: u64, end: u64, text: String) -> Annotation {
    Annotation::new(AnnotationKind::Field, class, start, end, vec![text])
}

impl ProcessNode for Mcp23s17Decoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<SpiPacket>("spi", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>("annotations", 0, PortDirection::Output)]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let packet = inputs
            .first()
            .and_then(|p| p.get::<SpiPacket>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError("Missing SPI input".into()))?
            .recv()?;
        let mut output = outputs
            .first()
            .and_then(|p| p.get::<Annotation>())
            .ok_or_else(|| WorkError::NodeError("Missing annotation output".into()))?;

        self.feed(&packet, &mut output)?;
        Ok(1)
    }
}
