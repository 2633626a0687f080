//! Bit, byte and sync reception for one UPDI command

use super::Engine;
use super::cursor::Edge;
use super::opcode::Opcode;
use crate::DecodeError;
use crate::nodes::decoders::types::{Annotation, AnnotationKind};
use crate::runtime::errors::WorkError;
use crate::runtime::sample::Sample;
use crate::runtime::stream::{Sink, Source};
use tracing::{debug, trace};

/// Why a command stopped early
#[derive(Debug)]
pub(super) enum Interrupt {
    /// Framing failure: drop the command and wait for the next sync
    Resync,
    /// End of stream or a fatal error
    Stop(WorkError),
}

impl From<WorkError> for Interrupt {
    fn from(e: WorkError) -> Self {
        Interrupt::Stop(e)
    }
}

impl From<DecodeError> for Interrupt {
    fn from(e: DecodeError) -> Self {
        Interrupt::Stop(e.into())
    }
}

pub(super) type Step<T = ()> = Result<T, Interrupt>;

/// A decoded 8 or 16-bit value and its rendering
pub(super) struct Value {
    pub value: u16,
    pub text: String,
}

/// Decoding context for one command, from its sync to its last byte
pub(super) struct Session<'a, S, K> {
    pub engine: &'a mut Engine,
    source: &'a mut S,
    out: &'a mut K,
    /// Annotations held back until a sync attempt succeeds
    held: Option<Vec<Annotation>>,
    /// Start of the current command; None inside REPEAT continuations
    pub cmd_start: Option<u64>,
    pub byte_start: u64,
    pub value_start: u64,
    /// Nominal end of the last frame; the cursor stops short of it
    frame_end: u64,
}

impl<'a, S: Source<Sample>, K: Sink<Annotation>> Session<'a, S, K> {
    pub fn new(engine: &'a mut Engine, source: &'a mut S, out: &'a mut K) -> Self {
        Self {
            engine,
            source,
            out,
            held: None,
            cmd_start: None,
            byte_start: 0,
            value_start: 0,
            frame_end: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.engine.cursor.now()
    }

    /// End of the element decoded last
    fn end(&self) -> u64 {
        self.now().max(self.frame_end)
    }

    fn spb(&self) -> u64 {
        self.engine.samples_per_bit
    }

    fn skip(&mut self, count: u64) -> Step<bool> {
        Ok(self.engine.cursor.skip(self.source, count)?)
    }

    pub fn put(&mut self, annotation: Annotation) -> Step {
        match &mut self.held {
            Some(held) => held.push(annotation),
            None => self.out.emit(annotation)?,
        }
        Ok(())
    }

    pub fn put_warning(&mut self, start: u64, message: impl Into<String>) -> Step {
        let end = self.end();
        self.put(Annotation::warning(start, end, message))
    }

    fn put_bit(&mut self, class: &'static str, start: u64, texts: &[&str]) -> Step {
        let end = self.end();
        self.put(Annotation::new(
            AnnotationKind::Bit,
            class,
            start,
            end,
            texts.iter().map(|t| t.to_string()).collect(),
        ))
    }

    pub fn put_field(&mut self, class: &'static str, start: u64, texts: Vec<String>) -> Step {
        let end = self.end();
        self.put(Annotation::new(AnnotationKind::Field, class, start, end, texts))
    }

    pub fn put_opcode(&mut self, name: &str) -> Step {
        self.put_field(
            "updi-opcode",
            self.byte_start,
            vec![format!("Opcode: {}", name), name.to_string()],
        )
    }

    /// Command annotation from the command's start to now
    pub fn put_cmd(&mut self, name: &str, operands: Option<String>) -> Step {
        let texts = match operands {
            Some(operands) => vec![format!("{} {}", name, operands), name.to_string()],
            None => vec![name.to_string()],
        };
        let start = self.cmd_start.unwrap_or(self.value_start);
        let end = self.end();
        self.engine.stats.commands += 1;
        self.put(Annotation::new(AnnotationKind::Command, "updi", start, end, texts))
    }

    /// Command annotation for a REPEAT iteration after the first
    pub fn put_continuation(&mut self, texts: Vec<String>) -> Step {
        let end = self.end();
        self.put(Annotation::new(
            AnnotationKind::Command,
            "updi",
            self.value_start,
            end,
            texts,
        ))
    }

    /// Decode one command: sync, opcode and its payload
    pub fn command(&mut self) -> Step {
        self.sync()?;
        self.cmd_start = Some(self.engine.sync_start);

        let cmd = self.read_byte()?;
        match Opcode::decode(cmd) {
            Some(op) => {
                trace!("[{}] Opcode {:02X}: {}", self.engine.name, cmd, op.mnemonic());
                self.put_opcode(op.mnemonic())?;
                (op.handler())(self, cmd)
            }
            None => self.unknown_opcode(cmd),
        }
    }

    pub fn unknown_opcode(&mut self, cmd: u8) -> Step {
        debug!("[{}] Unknown opcode {:02X}", self.engine.name, cmd);
        self.put_opcode("??")?;
        self.put_warning(self.byte_start, format!("Unknown opcode {:02X}", cmd))
    }

    /// Wait until a sync byte is received
    pub fn sync(&mut self) -> Step {
        while !self.try_sync()? {
            self.engine.stats.sync_abandoned += 1;
        }
        Ok(())
    }

    /// Measure the 0x55 sync byte starting at the next falling edge.
    ///
    /// Returns `Ok(false)` if the intervals are not plausible bit times; in
    /// that case nothing is emitted.
    fn try_sync(&mut self) -> Step<bool> {
        self.engine
            .cursor
            .wait_edge(self.source, Edge::Falling, None)?;
        let sync_start = self.now();
        self.frame_end = sync_start;

        self.held = Some(Vec::new());
        let measured = self.measure_sync(sync_start);
        let held = self.held.take().unwrap_or_default();

        if !measured? {
            return Ok(false);
        }
        for annotation in held {
            self.out.emit(annotation)?;
        }

        self.engine.sync_start = sync_start;
        self.engine.stats.syncs += 1;
        debug!(
            "[{}] Sync at {}: {} samples/bit{}",
            self.engine.name,
            sync_start,
            self.spb(),
            self.engine
                .baud_rate()
                .map(|baud| format!(", {:.0} baud", baud))
                .unwrap_or_default()
        );
        Ok(true)
    }

    fn measure_sync(&mut self, sync_start: u64) -> Step<bool> {
        let max_bit_time = self.engine.config.max_bit_time;
        let budget = Some(max_bit_time * 3);
        let intervals = self.engine.config.sync_intervals;

        // Start bit ends at the first rising edge
        self.engine
            .cursor
            .wait_edge(self.source, Edge::Rising, budget)?;
        let bit_time = self.now() - sync_start;
        if bit_time > max_bit_time {
            debug!("[{}] Sync abandoned: start bit {} samples", self.engine.name, bit_time);
            return Ok(false);
        }
        self.put_bit("start-bit", sync_start, &["Start bit", "Start", "S"])?;

        // Every following bit of 0x55 toggles the line
        for _ in 1..intervals {
            let bit_start = self.now();
            self.engine
                .cursor
                .wait_edge(self.source, Edge::Either, budget)?;
            let bit_time = self.now() - bit_start;
            if bit_time > max_bit_time {
                debug!("[{}] Sync abandoned: bit {} samples", self.engine.name, bit_time);
                return Ok(false);
            }
            self.put_bit("data-bit", bit_start, &["x"])?;
        }

        let total = self.now() - sync_start;
        let samples_per_bit = (total + intervals / 2) / intervals;
        if samples_per_bit == 0 {
            return Ok(false);
        }
        self.engine.samples_per_bit = samples_per_bit;

        // Last data bit and stop bits at the new rate
        self.data_bit(Some("x"))?;
        if !self.stop_bits()? {
            debug!("[{}] Sync abandoned: no stop bit", self.engine.name);
            return Ok(false);
        }

        self.put(Annotation::new(
            AnnotationKind::Byte,
            "byte-value",
            sync_start,
            self.end(),
            vec!["55".to_string()],
        ))?;
        self.put_field("sync", sync_start, vec!["SYNC".to_string()])?;
        Ok(true)
    }

    /// Wait for a start bit, checking it is still low at its midpoint
    fn start_bit(&mut self) -> Step<u64> {
        self.engine
            .cursor
            .wait_edge(self.source, Edge::Falling, None)?;
        let start = self.now();

        let spb = self.spb();
        if self.skip(spb / 2)? {
            debug!("[{}] False start bit at {}", self.engine.name, start);
            self.engine.stats.frame_errors += 1;
            return Err(Interrupt::Resync);
        }
        self.skip(spb.div_ceil(2))?;
        self.put_bit("start-bit", start, &["Start bit", "Start", "S"])?;
        Ok(start)
    }

    /// Read one bit, sampled at its midpoint
    fn data_bit(&mut self, label: Option<&str>) -> Step<bool> {
        let start = self.now();
        let spb = self.spb();
        let bit = self.skip(spb / 2)?;
        self.skip(spb.div_ceil(2))?;

        let digit = if bit { "1" } else { "0" };
        self.put_bit("data-bit", start, &[label.unwrap_or(digit)])?;
        Ok(bit)
    }

    /// Sample the first stop bit; returns whether it was high.
    ///
    /// The cursor stays at that midpoint so a rounded-up bit period cannot
    /// run past the next start bit. The annotations still cover both stop
    /// bits.
    fn stop_bits(&mut self) -> Step<bool> {
        let start = self.now();
        let spb = self.spb();
        let level = self.skip(spb / 2)?;
        self.frame_end = start + 2 * spb;

        if level {
            self.put_bit("stop-bit", start, &["Stop bit", "Stop", "T"])?;
        } else {
            self.put_warning(start, "Frame error")?;
        }
        Ok(level)
    }

    /// Receive one UART frame, LSB first
    pub fn read_byte(&mut self) -> Step<u8> {
        let start = self.start_bit()?;

        let mut value = 0u8;
        for idx in 0..8 {
            if self.data_bit(None)? {
                value |= 1 << idx;
            }
        }

        if !self.stop_bits()? {
            debug!("[{}] Frame error in byte at {}", self.engine.name, start);
            self.engine.stats.frame_errors += 1;
            return Err(Interrupt::Resync);
        }

        self.byte_start = start;
        trace!("[{}] Byte {:02X} at {}", self.engine.name, value, start);
        self.put(Annotation::new(
            AnnotationKind::Byte,
            "byte-value",
            start,
            self.end(),
            vec![format!("{:02X}", value)],
        ))?;
        Ok(value)
    }

    /// Read an 8-bit (`size` 0) or 16-bit little-endian (`size` 1) value
    pub fn read_value(&mut self, size: u8, class: &'static str, label: &'static str) -> Step<Value> {
        let (value, text) = match size {
            0 => {
                let value = self.read_byte()?;
                self.value_start = self.byte_start;
                (u16::from(value), format!("{:02X}", value))
            }
            1 => {
                let low = self.read_byte()?;
                self.value_start = self.byte_start;
                let high = self.read_byte()?;
                let value = u16::from_le_bytes([low, high]);
                (value, format!("{:04X}", value))
            }
            selector => {
                return Err(DecodeError::UnsupportedWidth {
                    field: label,
                    selector,
                }
                .into());
            }
        };

        self.put_field(
            class,
            self.value_start,
            vec![format!("{}: {}", label, text), text.clone()],
        )?;
        Ok(Value { value, text })
    }

    /// Read the device's ACK frame
    pub fn read_ack(&mut self) -> Step {
        let ack = self.read_byte()?;
        self.put_field("updi-ack", self.byte_start, vec!["ACK".to_string()])?;
        if ack != ACK {
            self.put_warning(self.byte_start, format!("Expected ACK, got {:02X}", ack))?;
        }
        Ok(())
    }
}

/// Byte the device answers a store with
const ACK: u8 = 0x40;
