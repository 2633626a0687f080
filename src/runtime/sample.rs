//! Core data types for signal processing
//!
//! All timestamps in this crate are sample numbers: the index of the sample
//! in the capture, counted at the capture's sample rate.

use std::fmt;

/// Sample representing a single line's level from a specific sample number
///
/// This is a run-length encoded representation that is sent only when the
/// line changes. The value remains constant until the next Sample arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Line level from this sample number on
    pub value: bool,
    /// Sample number at which this level started
    pub start_time: u64,
}

impl Sample {
    /// Create a new sample
    pub fn new(value: bool, start_time: u64) -> Self {
        Self { value, start_time }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sample[v={}, t={}]", self.value, self.start_time)
    }
}

/// Levels of several lines captured at the same sample number
///
/// Line `n` is bit `n` of `pins` (LSB-first, as DSLogic packs its blocks).
/// Like [`Sample`], a pin-vector holds until the next one arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicSample {
    /// Packed line levels
    pub pins: u16,
    /// Sample number at which these levels started
    pub start_time: u64,
}

impl LogicSample {
    /// Create a new pin-vector sample
    pub fn new(pins: u16, start_time: u64) -> Self {
        Self { pins, start_time }
    }

    /// Build a pin-vector from individual line levels, line 0 first
    pub fn from_lines(lines: &[bool], start_time: u64) -> Self {
        let pins = lines
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, &level)| acc | (u16::from(level) << i));
        Self { pins, start_time }
    }

    /// Level of a single line
    #[inline]
    pub fn pin(&self, line: usize) -> bool {
        (self.pins >> line) & 1 == 1
    }
}

impl fmt::Display for LogicSample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogicSample[pins={:#06b}, t={}]", self.pins, self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lines_packs_lsb_first() {
        let s = LogicSample::from_lines(&[true, false, true, true], 7);
        assert_eq!(s.pins, 0b1101);
        assert!(s.pin(0));
        assert!(!s.pin(1));
        assert!(s.pin(3));
        assert_eq!(s.start_time, 7);
    }
}
