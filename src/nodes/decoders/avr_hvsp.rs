//! AVR high-voltage serial programming (HVSP) decoder
//!
//! HVSP clocks three data lines with SCI. SII (instructions) and SDI (data)
//! are sampled on the rising edge, SDO on the falling edge. A frame is 11
//! clock positions: a start position, 8 data bits MSB-first and 2 trailer
//! positions. The instruction carried by SII/SDI is interpreted on the
//! falling edge of the last position.
//!
//! Lines are merged into [`LogicSample`]s with SCI on pin 0, SII on pin 1,
//! SDI on pin 2 and SDO on pin 3.

use super::types::{Annotation, AnnotationKind};
use crate::runtime::merge::ChannelMerger;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::sample::{LogicSample, Sample};
use crate::runtime::stream::{Sink, Source};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

const SCI: usize = 0;
const SII: usize = 1;
const SDI: usize = 2;
const SDO: usize = 3;

/// First and last clock positions that carry a data bit
const FIRST_DATA_BIT: u8 = 1;
const LAST_DATA_BIT: u8 = 8;

/// Control line carried by one SII bit position
struct SiiLine {
    name: &'static str,
    active_low: bool,
}

/// SII lines for clock positions 2..=8 (position 1 carries no control line)
const SII_LINES: [SiiLine; 7] = [
    SiiLine { name: "XA1", active_low: false },
    SiiLine { name: "XA0", active_low: false },
    SiiLine { name: "BS1", active_low: false },
    SiiLine { name: "WR", active_low: true },
    SiiLine { name: "OE", active_low: true },
    SiiLine { name: "BS2", active_low: false },
    SiiLine { name: "PAGEL", active_low: false },
];

/// Programming command selected by LOAD COMMAND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ChipErase,
    WriteFuse,
    WriteLock,
    WriteFlash,
    WriteEeprom,
    /// Also reads the oscillator calibration byte
    ReadSignature,
    /// Also reads the lock bits
    ReadFuse,
    ReadFlash,
    ReadEeprom,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x80 => Command::ChipErase,
            0x40 => Command::WriteFuse,
            0x20 => Command::WriteLock,
            0x10 => Command::WriteFlash,
            0x11 => Command::WriteEeprom,
            0x08 => Command::ReadSignature,
            0x04 => Command::ReadFuse,
            0x02 => Command::ReadFlash,
            0x03 => Command::ReadEeprom,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Command::ChipErase => 0x80,
            Command::WriteFuse => 0x40,
            Command::WriteLock => 0x20,
            Command::WriteFlash => 0x10,
            Command::WriteEeprom => 0x11,
            Command::ReadSignature => 0x08,
            Command::ReadFuse => 0x04,
            Command::ReadFlash => 0x02,
            Command::ReadEeprom => 0x03,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Command::ChipErase => "CE",
            Command::WriteFuse => "WFUSE",
            Command::WriteLock => "WLOCK",
            Command::WriteFlash => "WFLASH",
            Command::WriteEeprom => "WEEP",
            Command::ReadSignature => "RSIG",
            Command::ReadFuse => "RFUSE",
            Command::ReadFlash => "RFLASH",
            Command::ReadEeprom => "REEP",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Device state built up by the instruction stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceContext {
    /// Last command loaded; cleared by an unknown command
    pub command: Option<Command>,
    pub address: u16,
    pub value: u16,
}

/// Frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HvspConfig {
    /// Clock positions per frame; the counter wraps after the last one
    pub frame_positions: u8,
}

impl Default for HvspConfig {
    fn default() -> Self {
        Self { frame_positions: 11 }
    }
}

/// Fields of one instruction word
struct Instruction {
    xa: u8,
    bs: u8,
    wr: bool,
    oe: bool,
    pagel: bool,
}

impl Instruction {
    //   6   5   4   3   2   1    0
    // XA1 XA0 BS1 WR# OE# BS2 PAGEL
    fn from_sii(sii: u8) -> Self {
        Self {
            xa: (sii & 0x60) >> 5,
            bs: ((sii & 0x10) >> 4) | (sii & 0x02),
            wr: sii & 0x08 == 0,
            oe: sii & 0x04 == 0,
            pagel: sii & 0x01 != 0,
        }
    }

    /// First validation failure, if any
    fn strobe_error(&self) -> Option<&'static str> {
        // WR, OE and PAGEL are only allowed with XA=3
        if self.xa != 3 {
            if self.wr {
                return Some("Invalid WR");
            }
            if self.oe {
                return Some("Invalid OE");
            }
            if self.pagel {
                return Some("Invalid PAGEL");
            }
        }
        match (self.wr, self.oe, self.pagel) {
            (true, true, _) => Some("Invalid WR+OE"),
            (true, _, true) => Some("Invalid WR+PAGEL"),
            (_, true, true) => Some("Invalid OE+PAGEL"),
            _ => None,
        }
    }
}

/// AVR HVSP decoder node
///
/// Inputs: sci, sii, sdi, sdo (Sample channels)
/// Output: Annotation events
pub struct HvspDecoder {
    name: String,
    config: HvspConfig,

    old_pins: Option<u16>,
    old_sci: Option<bool>,
    /// Clock position; None until the first rising edge
    bitnum: Option<u8>,

    // Levels captured at the last clock edges
    sii: bool,
    sdi: bool,
    sdo: bool,

    bit_hightime: Option<u64>,
    bit_lowtime: Option<u64>,
    word_start: u64,
    word_in_start: u64,
    word_out_start: u64,

    sii_word: u8,
    sdi_word: u8,
    sdo_word: u8,

    context: DeviceContext,
    instructions: u64,

    channel_buffers: Vec<VecDeque<Sample>>,
    merger: ChannelMerger,
}

impl HvspDecoder {
    pub fn new() -> Self {
        Self {
            name: "avr_hvsp".to_string(),
            config: HvspConfig::default(),
            old_pins: None,
            old_sci: None,
            bitnum: None,
            sii: false,
            sdi: false,
            sdo: false,
            bit_hightime: None,
            bit_lowtime: None,
            word_start: 0,
            word_in_start: 0,
            word_out_start: 0,
            sii_word: 0,
            sdi_word: 0,
            sdo_word: 0,
            context: DeviceContext::default(),
            instructions: 0,
            channel_buffers: (0..4).map(|_| VecDeque::new()).collect(),
            merger: ChannelMerger::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: HvspConfig) -> Self {
        self.config = config;
        self
    }

    /// Device state as of the last interpreted instruction
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Decode every sample from `source` until it is exhausted
    pub fn decode<S, K>(&mut self, source: &mut S, out: &mut K) -> WorkResult
    where
        S: Source<LogicSample>,
        K: Sink<Annotation>,
    {
        loop {
            let sample = match source.recv() {
                Ok(sample) => sample,
                Err(WorkError::Shutdown) => return Ok(()),
                Err(e) => return Err(e),
            };
            self.feed(sample, out)?;
        }
    }

    /// Consume one pin-vector sample.
    ///
    /// Repeated pin-vectors and changes on the data lines alone are ignored;
    /// only SCI transitions advance the decoder.
    pub fn feed<K: Sink<Annotation>>(&mut self, sample: LogicSample, out: &mut K) -> WorkResult {
        if self.old_pins == Some(sample.pins) {
            return Ok(());
        }
        self.old_pins = Some(sample.pins);

        let sci = sample.pin(SCI);
        let Some(old_sci) = self.old_sci.replace(sci) else {
            return Ok(());
        };
        if sci == old_sci {
            return Ok(());
        }

        if sci {
            let bitnum = match self.bitnum {
                Some(n) if n + 1 < self.config.frame_positions => n + 1,
                _ => 0,
            };
            self.bitnum = Some(bitnum);
            self.sci_rise(sample, bitnum, out)
        } else {
            self.sci_fall(sample, self.bitnum, out)
        }
    }

    fn sci_rise<K: Sink<Annotation>>(&mut self, sample: LogicSample, bitnum: u8, out: &mut K) -> WorkResult {
        let now = sample.start_time;
        self.sii = sample.pin(SII);
        self.sdi = sample.pin(SDI);

        let bit_start = self.bit_hightime.replace(now).unwrap_or(now);

        if bitnum == 0 {
            self.word_start = now;
        }
        if !(FIRST_DATA_BIT..=LAST_DATA_BIT).contains(&bitnum) {
            return Ok(());
        }

        // The SDO bit captured at the previous fall spans the last clock period
        out.emit(plain_bit("sdo-bits", bit_start, now, self.sdo))?;

        if bitnum == FIRST_DATA_BIT {
            self.word_out_start = bit_start;
            self.sdo_word = 0;
        }
        self.sdo_word = (self.sdo_word << 1) | u8::from(self.sdo);

        if bitnum == LAST_DATA_BIT {
            trace!("SDO word {:02X}", self.sdo_word);
            out.emit(word("sdo", self.word_out_start, now, self.sdo_word))?;
        }
        Ok(())
    }

    fn sci_fall<K: Sink<Annotation>>(
        &mut self,
        sample: LogicSample,
        bitnum: Option<u8>,
        out: &mut K,
    ) -> WorkResult {
        let now = sample.start_time;
        self.sdo = sample.pin(SDO);

        let bit_start = self.bit_lowtime.replace(now).unwrap_or(now);

        let Some(bitnum) = bitnum else {
            return Ok(());
        };

        if bitnum + 1 == self.config.frame_positions {
            self.do_word(self.word_start, now, out)?;
        }
        if !(FIRST_DATA_BIT..=LAST_DATA_BIT).contains(&bitnum) {
            return Ok(());
        }

        if bitnum > FIRST_DATA_BIT {
            let line = &SII_LINES[usize::from(bitnum - 2)];
            let asserted = self.sii != line.active_low;
            let text = if asserted { line.name } else { " " };
            out.emit(Annotation::new(
                AnnotationKind::Bit,
                "sii-bits",
                bit_start,
                now,
                vec![text.to_string()],
            ))?;
        }
        out.emit(plain_bit("sdi-bits", bit_start, now, self.sdi))?;

        if bitnum == FIRST_DATA_BIT {
            self.word_in_start = bit_start;
            self.sii_word = 0;
            self.sdi_word = 0;
        }
        self.sii_word = (self.sii_word << 1) | u8::from(self.sii);
        self.sdi_word = (self.sdi_word << 1) | u8::from(self.sdi);

        if bitnum == LAST_DATA_BIT {
            trace!("SII word {:02X}, SDI word {:02X}", self.sii_word, self.sdi_word);
            out.emit(word("sii", self.word_in_start, now, self.sii_word))?;
            out.emit(word("sdi", self.word_in_start, now, self.sdi_word))?;
        }
        Ok(())
    }

    /// Interpret one SII/SDI instruction pair
    fn do_word<K: Sink<Annotation>>(&mut self, start: u64, end: u64, out: &mut K) -> WorkResult {
        let instr = Instruction::from_sii(self.sii_word);
        let sdi = self.sdi_word;
        self.instructions += 1;

        if let Some(warning) = instr.strobe_error() {
            debug!("[{}] {} (SII {:02X})", self.name, warning, self.sii_word);
            return out.emit(Annotation::warning(start, end, warning));
        }

        let text = match (instr.xa, instr.bs) {
            (0, 0) => {
                self.context.address = (self.context.address & 0xFF00) | u16::from(sdi);
                format!("LLA {:02X}", sdi)
            }
            (0, 1) => {
                self.context.address = (u16::from(sdi) << 8) | (self.context.address & 0x00FF);
                format!("LHA {:02X}", sdi)
            }
            (0, bs) => return out.emit(Annotation::warning(start, end, format!("LA invalid BS={}", bs))),
            (1, 0) => {
                self.context.value = (self.context.value & 0xFF00) | u16::from(sdi);
                format!("LLD {:02X}", sdi)
            }
            (1, 1) => {
                self.context.value = (u16::from(sdi) << 8) | (self.context.value & 0x00FF);
                format!("LHD {:02X}", sdi)
            }
            (1, bs) => return out.emit(Annotation::warning(start, end, format!("LD invalid BS={}", bs))),
            (2, 0) => match Command::from_code(sdi) {
                Some(command) => {
                    self.context.command = Some(command);
                    format!("CMD {}", command)
                }
                None => {
                    debug!("[{}] Unknown command {:02X}", self.name, sdi);
                    self.context.command = None;
                    return out.emit(Annotation::warning(start, end, "CMD unknown"));
                }
            },
            (2, _) => return out.emit(Annotation::warning(start, end, "Invalid BS")),
            // TODO: decode the XA=3 strobe family (WR/OE/PAGEL pulses)
            _ => return out.emit(Annotation::warning(start, end, "XA=3 not handled")),
        };

        trace!("[{}] {}", self.name, text);
        out.emit(Annotation::new(AnnotationKind::Command, "instr", start, end, vec![text]))
    }
}

impl Default for HvspDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn plain_bit(class: &'static str, start: u64, end: u64, value: bool) -> Annotation {
    Annotation::new(
        AnnotationKind::Bit,
        class,
        start,
        end,
        vec![u8::from(value).to_string()],
    )
}

fn word(class: &'static str, start: u64, end: u64, value: u8) -> Annotation {
    Annotation::new(AnnotationKind::Byte, class, start, end, vec![format!("{:02X}", value)])
}

impl ProcessNode for HvspDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        4
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        ["sci", "sii", "sdi", "sdo"]
            .iter()
            .enumerate()
            .map(|(i, name)| PortSchema::new::<Sample>(*name, i, PortDirection::Input))
            .collect()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>("annotations", 0, PortDirection::Output)]
    }

    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let mut output = outputs
            .first()
            .and_then(|p| p.get::<Annotation>())
            .ok_or_else(|| WorkError::NodeError("Missing annotation output".into()))?;

        let sample = {
            let mut lines = inputs
                .iter()
                .zip(self.channel_buffers.iter_mut())
                .map(|(port, buffer)| {
                    port.get::<Sample>(buffer)
                        .ok_or_else(|| WorkError::NodeError("Missing HVSP line input".into()))
                })
                .collect::<WorkResult<Vec<_>>>()?;
            self.merger.next(&mut lines)?
        };

        let before = self.instructions;
        self.feed(sample, &mut output)?;
        if self.instructions == before {
            Ok(0)
        } else {
            Ok(1)
        }
    }
}
