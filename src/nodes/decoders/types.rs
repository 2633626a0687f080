//! Common decoder types

use std::fmt;

/// Category of an annotation, from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    /// A single protocol bit
    Bit,
    /// An assembled byte or word
    Byte,
    /// A protocol field (address, data, opcode, register value)
    Field,
    /// A fully decoded command
    Command,
    /// Protocol violation or unhandled traffic
    Warning,
}

/// A decoded element covering the half-open sample range `[start_time, end_time)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    /// Decoder-specific row, e.g. `"sii-bits"` or `"updi-opcode"`
    pub class: &'static str,
    pub start_time: u64,
    pub end_time: u64,
    /// Renderings, longest first
    pub texts: Vec<String>,
}

/// Class shared by every decoder's warning row
pub const WARNINGS: &str = "warnings";

impl Annotation {
    pub fn new(
        kind: AnnotationKind,
        class: &'static str,
        start_time: u64,
        end_time: u64,
        texts: Vec<String>,
    ) -> Self {
        Self {
            kind,
            class,
            start_time,
            end_time,
            texts,
        }
    }

    pub fn warning(start_time: u64, end_time: u64, message: impl Into<String>) -> Self {
        Self::new(
            AnnotationKind::Warning,
            WARNINGS,
            start_time,
            end_time,
            vec![message.into()],
        )
    }

    /// Longest rendering
    pub fn text(&self) -> &str {
        self.texts.first().map(String::as_str).unwrap_or_default()
    }

    /// Shortest rendering
    pub fn short_text(&self) -> &str {
        self.texts.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_warning(&self) -> bool {
        self.kind == AnnotationKind::Warning
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:>10}-{:<10} {:<12} {}",
            self.start_time,
            self.end_time,
            self.class,
            self.text()
        )
    }
}

/// One SPI word with the sample range it was clocked in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiWord {
    pub value: u8,
    pub start_time: u64,
    pub end_time: u64,
}

impl SpiWord {
    pub fn new(value: u8, start_time: u64, end_time: u64) -> Self {
        Self {
            value,
            start_time,
            end_time,
        }
    }
}

/// Output of an SPI framing layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiPacket {
    /// All words exchanged while chip select was asserted
    Transfer {
        mosi: Vec<SpiWord>,
        miso: Vec<SpiWord>,
    },
    /// A single word pair
    Data {
        mosi: SpiWord,
        miso: Option<SpiWord>,
    },
    /// Chip select changed state
    CsChange {
        active: bool,
        start_time: u64,
        end_time: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderings() {
        let ann = Annotation::new(
            AnnotationKind::Bit,
            "start-bit",
            3,
            9,
            vec!["Start bit".into(), "Start".into(), "S".into()],
        );
        assert_eq!(ann.text(), "Start bit");
        assert_eq!(ann.short_text(), "S");
        assert!(!ann.is_warning());
        assert!(ann.to_string().contains("Start bit"));

        let warn = Annotation::warning(1, 2, "Frame error");
        assert_eq!(warn.class, WARNINGS);
        assert_eq!(warn.text(), warn.short_text());
    }
}
