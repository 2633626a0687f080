//! UPDI instruction set and per-opcode payload grammars

use super::session::{Session, Step};
use super::sib::{SIB_LEN, SystemInfo};
use crate::DecodeError;
use crate::nodes::decoders::types::Annotation;
use crate::runtime::sample::Sample;
use crate::runtime::stream::{Sink, Source};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Lds,
    Ld,
    Sts,
    St,
    Ldcs,
    Repeat,
    Stcs,
    Key,
    ReadSib,
}

pub(super) type Handler<'a, S, K> = fn(&mut Session<'a, S, K>, u8) -> Step;

impl Opcode {
    /// Classify a command byte. KEY and READSIB share the top bits of
    /// the 0xE0 family and are matched first.
    pub fn decode(cmd: u8) -> Option<Self> {
        match cmd {
            0xE0..=0xE3 => Some(Opcode::Key),
            0xE5 => Some(Opcode::ReadSib),
            _ => match cmd & 0xE0 {
                0x00 => Some(Opcode::Lds),
                0x20 => Some(Opcode::Ld),
                0x40 => Some(Opcode::Sts),
                0x60 => Some(Opcode::St),
                0x80 => Some(Opcode::Ldcs),
                0xA0 => Some(Opcode::Repeat),
                0xC0 => Some(Opcode::Stcs),
                _ => None,
            },
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lds => "LDS",
            Opcode::Ld => "LD",
            Opcode::Sts => "STS",
            Opcode::St => "ST",
            Opcode::Ldcs => "LDCS",
            Opcode::Repeat => "REPEAT",
            Opcode::Stcs => "STCS",
            Opcode::Key => "KEY",
            Opcode::ReadSib => "READSIB",
        }
    }

    pub(super) fn handler<'a, S, K>(self) -> Handler<'a, S, K>
    where
        S: Source<Sample>,
        K: Sink<Annotation>,
    {
        match self {
            Opcode::Lds => Session::lds,
            Opcode::Ld => Session::ld,
            Opcode::Sts => Session::sts,
            Opcode::St => Session::st,
            Opcode::Ldcs => Session::ldcs,
            Opcode::Repeat => Session::repeat,
            Opcode::Stcs => Session::stcs,
            Opcode::Key => Session::key,
            Opcode::ReadSib => Session::read_sib,
        }
    }
}

fn address_size(cmd: u8) -> u8 {
    (cmd >> 2) & 0x03
}

fn data_size(cmd: u8) -> u8 {
    cmd & 0x03
}

/// Pointer access mode of LD/ST
fn pointer(cmd: u8) -> Option<&'static str> {
    match (cmd >> 2) & 0x03 {
        0 => Some("[P]"),
        1 => Some("[P+]"),
        2 => Some("P"),
        _ => None,
    }
}

impl<'a, S: Source<Sample>, K: Sink<Annotation>> Session<'a, S, K> {
    fn lds(&mut self, cmd: u8) -> Step {
        let addr = self.read_value(address_size(cmd), "updi-addr", "Addr")?;
        let data = self.read_value(data_size(cmd), "updi-data", "Data")?;
        self.put_cmd("LDS", Some(format!("{} <- {}", addr.text, data.text)))
    }

    fn ld(&mut self, cmd: u8) -> Step {
        let data = self.read_value(data_size(cmd), "updi-data", "Data")?;

        // The pointer register itself cannot be loaded from
        let Some(ptr) = pointer(cmd).filter(|p| *p != "P") else {
            return self.put_warning(
                self.value_start,
                format!("LD reserved pointer mode {}", address_size(cmd)),
            );
        };

        if self.cmd_start.is_some() {
            self.put_cmd("LD", Some(format!("{} <- {}", ptr, data.text)))
        } else {
            self.put_continuation(vec![format!("... <- {}", data.text), data.text])
        }
    }

    fn sts(&mut self, cmd: u8) -> Step {
        let addr = self.read_value(address_size(cmd), "updi-addr", "Addr")?;
        self.read_ack()?;
        let data = self.read_value(data_size(cmd), "updi-data", "Data")?;
        self.read_ack()?;
        self.put_cmd("STS", Some(format!("{}, {}", addr.text, data.text)))
    }

    fn st(&mut self, cmd: u8) -> Step {
        let data = self.read_value(data_size(cmd), "updi-data", "Data")?;

        let Some(ptr) = pointer(cmd) else {
            return self.put_warning(self.value_start, "ST reserved pointer mode 3");
        };

        // The command is only complete once the device acknowledged it
        self.read_ack()?;

        if self.cmd_start.is_some() {
            self.put_cmd("ST", Some(format!("{}, {}", ptr, data.text)))
        } else {
            self.put_continuation(vec![format!("..., {}", data.text), data.text])
        }
    }

    fn ldcs(&mut self, cmd: u8) -> Step {
        let data = self.read_value(0, "updi-data", "Data")?;
        self.put_cmd("LDCS", Some(format!("[{:02X}] <- {}", cmd & 0x0F, data.text)))
    }

    fn stcs(&mut self, cmd: u8) -> Step {
        let data = self.read_value(0, "updi-data", "Data")?;
        self.put_cmd("STCS", Some(format!("[{:02X}], {}", cmd & 0x0F, data.text)))
    }

    fn repeat(&mut self, cmd: u8) -> Step {
        let count = self.read_value(data_size(cmd), "updi-data", "Count")?.value;
        self.put_cmd("REPEAT", Some(count.to_string()))?;

        // The repeated instruction comes with its own sync
        self.sync()?;
        self.cmd_start = Some(self.engine.sync_start);

        let cmd = self.read_byte()?;
        let op = match Opcode::decode(cmd) {
            None => return self.unknown_opcode(cmd),
            Some(Opcode::Repeat) => {
                debug!("[{}] Nested REPEAT", self.engine.name);
                self.put_opcode("REPEAT!")?;
                return self.put_warning(self.byte_start, "REPEAT cannot be repeated");
            }
            Some(op) => op,
        };
        self.put_opcode(op.mnemonic())?;

        let handler = op.handler();
        for _ in 0..=u32::from(count) {
            handler(self, cmd)?;
            self.cmd_start = None;
        }
        Ok(())
    }

    fn key(&mut self, cmd: u8) -> Step {
        let count = match data_size(cmd) {
            0 => 8,
            1 => 16,
            selector => {
                return Err(DecodeError::UnsupportedWidth {
                    field: "Key",
                    selector,
                }
                .into());
            }
        };

        let key = self.read_block(count)?;
        let hex = to_hex(&key);
        self.put_field(
            "updi-data",
            self.value_start,
            vec![format!("Key: {}", hex), hex.clone()],
        )?;
        self.put_cmd("KEY", Some(format!("0x{}", hex)))
    }

    fn read_sib(&mut self, _cmd: u8) -> Step {
        let mut sib = [0u8; SIB_LEN];
        sib.copy_from_slice(&self.read_block(SIB_LEN)?);
        let hex = to_hex(&sib);
        self.put_field(
            "updi-data",
            self.value_start,
            vec![format!("SIB: {}", hex), hex.clone()],
        )?;

        match SystemInfo::parse(&sib) {
            Ok(info) => self.put_cmd("READSIB", Some(info.to_string())),
            Err(e) => {
                debug!("[{}] {}", self.engine.name, e);
                self.put_warning(self.value_start, e.to_string())?;
                self.put_cmd("READSIB", Some(hex))
            }
        }
    }

    /// Read `count` bytes; `value_start` is set to the first byte's start
    fn read_block(&mut self, count: usize) -> Step<Vec<u8>> {
        let mut bytes = Vec::with_capacity(count);
        for idx in 0..count {
            bytes.push(self.read_byte()?);
            if idx == 0 {
                self.value_start = self.byte_start;
            }
        }
        Ok(bytes)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
