//! MAX7219/MAX7221 LED display driver decoder
//!
//! Each write is two 8-bit words while chip select is asserted: a register
//! address followed by its value. Addresses 1..=8 are the digit registers.

use super::types::{Annotation, AnnotationKind, SpiPacket, SpiWord};
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::stream::{Sink, Source};
use std::collections::VecDeque;
use tracing::debug;

/// Name and value rendering of a control register
fn control_register(addr: u8, value: u8) -> Option<(&'static str, String)> {
    Some(match addr {
        0x00 => ("No-op", String::new()),
        0x09 => ("Decode", format!("0b{:08b}", value)),
        0x0A => (
            "Intensity",
            match value & 0x0F {
                0 => "min".to_string(),
                15 => "max".to_string(),
                level => level.to_string(),
            },
        ),
        0x0B => ("Scan limit", (u16::from(value) + 1).to_string()),
        0x0C => ("Shutdown", if value != 0 { "off" } else { "on" }.to_string()),
        0x0F => ("Display test", if value != 0 { "on" } else { "off" }.to_string()),
        _ => return None,
    })
}

/// MAX7219 decoder node
///
/// Input: SpiPacket events (Data and CsChange)
/// Output: Annotation events
pub struct Max7219Decoder {
    name: String,
    cs_asserted: bool,
    cs_start: u64,
    /// Words seen since chip select was asserted
    pos: usize,
    address: Option<SpiWord>,
    buffer: VecDeque<SpiPacket>,
}

impl Max7219Decoder {
    pub fn new() -> Self {
        Self {
            name: "max7219".to_string(),
            cs_asserted: false,
            cs_start: 0,
            pos: 0,
            address: None,
            buffer: VecDeque::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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

    /// Decode one packet; whole transfers are ignored
    pub fn feed<K: Sink<Annotation>>(&mut self, packet: &SpiPacket, out: &mut K) -> WorkResult {
        match *packet {
            SpiPacket::Data { mosi, .. } => self.data(mosi, out),
            SpiPacket::CsChange {
                active,
                start_time,
                end_time,
            } => self.cs_change(active, start_time, end_time, out),
            SpiPacket::Transfer { .. } => Ok(()),
        }
    }

    fn data<K: Sink<Annotation>>(&mut self, word: SpiWord, out: &mut K) -> WorkResult {
        if !self.cs_asserted {
            return Ok(());
        }

        match (self.pos, self.address) {
            (0, _) => self.address = Some(word),
            (1, Some(addr)) => {
                let (start, end) = (addr.start_time, word.end_time);
                let annotation = match (addr.value, control_register(addr.value, word.value)) {
                    (digit @ 1..=8, _) => Annotation::new(
                        AnnotationKind::Field,
                        "digit",
                        start,
                        end,
                        vec![format!("Digit {}: {:02X}", digit, word.value)],
                    ),
                    (_, Some((name, value))) => Annotation::new(
                        AnnotationKind::Field,
                        "register",
                        start,
                        end,
                        vec![format!("{}: {}", name, value)],
                    ),
                    (unknown, None) => {
                        Annotation::warning(start, end, format!("Unknown register {:02X}", unknown))
                    }
                };
                out.emit(annotation)?;
            }
            _ => {}
        }

        self.pos += 1;
        Ok(())
    }

    fn cs_change<K: Sink<Annotation>>(
        &mut self,
        active: bool,
        start_time: u64,
        end_time: u64,
        out: &mut K,
    ) -> WorkResult {
        self.cs_asserted = active;
        if active {
            self.pos = 0;
            self.address = None;
            self.cs_start = start_time;
            return Ok(());
        }

        // pos 0 is a CS glitch, not worth a warning
        let warning = match self.pos {
            1 => "Short write",
            n if n > 2 => "Overlong write",
            _ => return Ok(()),
        };
        debug!("[{}] {} ({} words)", self.name, warning, self.pos);
        out.emit(Annotation::warning(self.cs_start, end_time, warning))
    }
}

impl Default for Max7219Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNode for Max7219Decoder {
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

#[cfg(test)]
mod tests {
    use super::*;

    /// CS window containing the given words, 8 samples per word
    fn write(t: u64, values: &[u8]) -> Vec<SpiPacket> {
        let mut packets = vec![SpiPacket::CsChange {
            active: true,
            start_time: t,
            end_time: t,
        }];
        let mut end = t;
        for (i, &v) in values.iter().enumerate() {
            let start = t + 1 + i as u64 * 8;
            end = start + 8;
            packets.push(SpiPacket::Data {
                mosi: SpiWord::new(v, start, end),
                miso: None,
            });
        }
        packets.push(SpiPacket::CsChange {
            active: false,
            start_time: end + 1,
            end_time: end + 1,
        });
        packets
    }

    fn run(packets: Vec<SpiPacket>) -> Vec<Annotation> {
        let mut source: VecDeque<_> = packets.into();
        let mut out = Vec::new();
        Max7219Decoder::new().decode(&mut source, &mut out).unwrap();
        out
    }

    fn texts(out: &[Annotation]) -> Vec<&str> {
        out.iter().map(|a| a.text()).collect()
    }

    #[test]
    fn test_registers() {
        let packets = [
            write(0, &[0x09, 0xFF]),
            write(100, &[0x0A, 0x00]),
            write(200, &[0x0A, 0x07]),
            write(300, &[0x0A, 0x0F]),
            write(400, &[0x0B, 0x07]),
            write(500, &[0x0C, 0x01]),
            write(600, &[0x0F, 0x00]),
            write(700, &[0x00, 0x00]),
        ]
        .concat();

        assert_eq!(
            texts(&run(packets)),
            vec![
                "Decode: 0b11111111",
                "Intensity: min",
                "Intensity: 7",
                "Intensity: max",
                "Scan limit: 8",
                "Shutdown: off",
                "Display test: off",
                "No-op: ",
            ]
        );
    }

    #[test]
    fn test_digit_spans_address_and_value() {
        let out = run(write(10, &[0x03, 0x7E]));

        assert_eq!(texts(&out), vec!["Digit 3: 7E"]);
        assert_eq!(out[0].class, "digit");
        assert_eq!((out[0].start_time, out[0].end_time), (11, 27));
    }

    #[test]
    fn test_unknown_register() {
        let out = run(write(0, &[0x0D, 0x01]));
        assert_eq!(texts(&out), vec!["Unknown register 0D"]);
        assert!(out[0].is_warning());
    }

    #[test]
    fn test_short_and_overlong_writes() {
        let packets = [write(0, &[0x01]), write(100, &[]), write(200, &[0x01, 0x02, 0x03])].concat();
        let out = run(packets);

        assert_eq!(texts(&out), vec!["Short write", "Digit 1: 02", "Overlong write"]);
        assert_eq!(out[0].start_time, 0);
        assert_eq!(out[2].start_time, 200);
    }

    #[test]
    fn test_words_outside_cs_are_ignored() {
        let out = run(vec![SpiPacket::Data {
            mosi: SpiWord::new(0x01, 0, 8),
            miso: None,
        }]);
        assert!(out.is_empty());
    }
}
