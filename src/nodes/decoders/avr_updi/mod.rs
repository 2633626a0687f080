//! AVR UPDI (Unified Program and Debug Interface) decoder
//!
//! UPDI is a half-duplex UART on a single line: a start bit, 8 data bits
//! LSB-first and two stop bit times. The host opens every instruction with a
//! 0x55 sync byte, whose alternating bits let the decoder measure the bit
//! period without knowing the baud rate in advance.
//!
//! Decoding a command:
//!   1. Wait for a falling edge and time the 8 bit intervals of the sync byte
//!   2. Read the opcode byte at the recovered rate
//!   3. Read the opcode's payload (addresses, data, ACKs, key, SIB)
//!   4. Emit the command annotation
//!
//! A framing error drops the current command and goes back to step 1.

mod cursor;
mod opcode;
mod session;
mod sib;

pub use cursor::{Edge, LineCursor};
pub use opcode::Opcode;
pub use sib::SystemInfo;

use super::types::Annotation;
use crate::DecodeError;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::sample::Sample;
use crate::runtime::stream::{Sink, Source};
use crate::runtime::until_shutdown;
use session::{Interrupt, Session};
use std::collections::VecDeque;
use tracing::debug;

/// Sync detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdiConfig {
    /// Nominal capture rate in Hz; decoding refuses to start without it
    pub samplerate: Option<u64>,
    /// Longest plausible bit time in samples. Edges are awaited for three
    /// times this long before a sync attempt is abandoned.
    pub max_bit_time: u64,
    /// Bit intervals timed from the sync byte
    pub sync_intervals: u64,
}

impl Default for UpdiConfig {
    fn default() -> Self {
        Self {
            samplerate: None,
            max_bit_time: 200,
            sync_intervals: 8,
        }
    }
}

/// Counters kept across the decoder's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdiStats {
    pub syncs: u64,
    pub sync_abandoned: u64,
    pub frame_errors: u64,
    pub commands: u64,
}

/// Line position and timing state shared by every command
struct Engine {
    name: String,
    config: UpdiConfig,
    cursor: LineCursor,
    /// Bit period from the last sync; 0 before the first one
    samples_per_bit: u64,
    sync_start: u64,
    stats: UpdiStats,
}

impl Engine {
    fn baud_rate(&self) -> Option<f64> {
        let rate = self.config.samplerate?;
        (self.samples_per_bit > 0).then(|| rate as f64 / self.samples_per_bit as f64)
    }

    fn check_samplerate(&self) -> Result<u64, DecodeError> {
        self.config.samplerate.ok_or(DecodeError::MissingSampleRate)
    }

    fn step<S, K>(&mut self, source: &mut S, out: &mut K) -> WorkResult
    where
        S: Source<Sample>,
        K: Sink<Annotation>,
    {
        self.check_samplerate()?;
        match Session::new(self, source, out).command() {
            Ok(()) | Err(Interrupt::Resync) => Ok(()),
            Err(Interrupt::Stop(e)) => Err(e),
        }
    }
}

/// AVR UPDI decoder node
///
/// Input: updi (Sample channel)
/// Output: Annotation events
pub struct UpdiDecoder {
    engine: Engine,
    buffer: VecDeque<Sample>,
}

impl UpdiDecoder {
    pub fn new() -> Self {
        Self {
            engine: Engine {
                name: "avr_updi".to_string(),
                config: UpdiConfig::default(),
                cursor: LineCursor::new(),
                samples_per_bit: 0,
                sync_start: 0,
                stats: UpdiStats::default(),
            },
            buffer: VecDeque::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.engine.name = name.into();
        self
    }

    /// Replaces the whole configuration, including the sample rate
    pub fn with_config(mut self, config: UpdiConfig) -> Self {
        self.engine.config = config;
        self
    }

    pub fn with_samplerate(mut self, hz: u64) -> Self {
        self.set_samplerate(hz);
        self
    }

    pub fn set_samplerate(&mut self, hz: u64) {
        self.engine.config.samplerate = Some(hz);
    }

    pub fn config(&self) -> &UpdiConfig {
        &self.engine.config
    }

    pub fn stats(&self) -> UpdiStats {
        self.engine.stats
    }

    /// Bit period measured at the last sync
    pub fn samples_per_bit(&self) -> Option<u64> {
        (self.engine.samples_per_bit > 0).then_some(self.engine.samples_per_bit)
    }

    /// Baud rate derived from the last sync and the sample rate
    pub fn baud_rate(&self) -> Option<f64> {
        self.engine.baud_rate()
    }

    /// Decode one command, from its sync byte to its last payload byte.
    ///
    /// A command cut short by a framing error is dropped and `Ok(())` is
    /// returned. The end of the stream is `Err(WorkError::Shutdown)`.
    pub fn step<S, K>(&mut self, source: &mut S, out: &mut K) -> WorkResult
    where
        S: Source<Sample>,
        K: Sink<Annotation>,
    {
        self.engine.step(source, out)
    }

    /// Decode commands until `source` is exhausted
    pub fn decode<S, K>(&mut self, source: &mut S, out: &mut K) -> WorkResult
    where
        S: Source<Sample>,
        K: Sink<Annotation>,
    {
        let samplerate = self.engine.check_samplerate()?;
        debug!("[{}] Decoding at {} Hz", self.engine.name, samplerate);

        loop {
            if let Err(e) = self.step(source, out) {
                let stats = self.engine.stats;
                debug!(
                    "[{}] Stopped after {} commands, {} syncs ({} abandoned), {} frame errors",
                    self.engine.name,
                    stats.commands,
                    stats.syncs,
                    stats.sync_abandoned,
                    stats.frame_errors
                );
                return until_shutdown(Err(e));
            }
        }
    }
}

impl Default for UpdiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNode for UpdiDecoder {
    fn name(&self) -> &str {
        &self.engine.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Sample>("updi", 0, PortDirection::Input)]
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>("annotations", 0, PortDirection::Output)]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut line = inputs
            .first()
            .and_then(|p| p.get::<Sample>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError("Missing UPDI input".into()))?;
        let mut output = outputs
            .first()
            .and_then(|p| p.get::<Annotation>())
            .ok_or_else(|| WorkError::NodeError("Missing annotation output".into()))?;

        let before = self.engine.stats.commands;
        self.engine.step(&mut line, &mut output)?;
        Ok((self.engine.stats.commands - before) as usize)
    }
}
