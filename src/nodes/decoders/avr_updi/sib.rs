//! System information block returned by READSIB

use crate::DecodeError;
use std::fmt;

/// Bytes returned by READSIB
pub const SIB_LEN: usize = 16;

/// ASCII subfields of the 16-byte SIB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// Device family, e.g. `tinyAVR`
    pub family: String,
    pub nvm_version: String,
    pub ocd_version: String,
    pub debug_osc: String,
}

fn ascii(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    if !bytes.is_ascii() {
        return Err(DecodeError::NonAscii { field });
    }
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

impl SystemInfo {
    pub fn parse(sib: &[u8; SIB_LEN]) -> Result<Self, DecodeError> {
        Ok(Self {
            family: ascii(&sib[0..7], "SIB family")?.trim().to_string(),
            nvm_version: ascii(&sib[8..11], "SIB NVM version")?,
            ocd_version: ascii(&sib[11..14], "SIB OCD version")?,
            debug_osc: ascii(&sib[15..16], "SIB debug oscillator")?,
        })
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "family=\"{}\" nvmver={} ocdver={} dbgosc={}",
            self.family, self.nvm_version, self.ocd_version, self.debug_osc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tiny_sib() {
        let info = SystemInfo::parse(b"tinyAVR P:0D:0-3").unwrap();
        assert_eq!(info.family, "tinyAVR");
        assert_eq!(info.nvm_version, "P:0");
        assert_eq!(info.ocd_version, "D:0");
        assert_eq!(info.debug_osc, "3");
        assert_eq!(
            info.to_string(),
            "family=\"tinyAVR\" nvmver=P:0 ocdver=D:0 dbgosc=3"
        );
    }

    #[test]
    fn test_family_is_trimmed() {
        let info = SystemInfo::parse(b"AVR     P:2D:1-8").unwrap();
        assert_eq!(info.family, "AVR");
        assert_eq!(info.nvm_version, "P:2");
    }

    #[test]
    fn test_non_ascii_is_an_error() {
        let mut sib = *b"tinyAVR P:0D:0-3";
        sib[9] = 0xC3;
        assert_eq!(
            SystemInfo::parse(&sib),
            Err(DecodeError::NonAscii { field: "SIB NVM version" })
        );
    }
}
