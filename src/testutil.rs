//! Synthetic waveforms for decoder tests

use crate::nodes::decoders::Annotation;
use crate::runtime::sample::{LogicSample, Sample};
use std::collections::HashMap;

/// Half of one HVSP clock period, in samples
const HVSP_HALF_PERIOD: u64 = 5;

/// HVSP frames for `(sii, sdi, sdo)` words.
///
/// Each clock position sets up the data lines with SCI low, raises SCI one
/// half period later and drops it again after another. SII and SDI carry the
/// word MSB-first on positions 1..=8; SDO is presented on the falls of
/// positions 0..=7.
pub fn hvsp_session(words: &[(u8, u8, u8)]) -> Vec<LogicSample> {
    let mut samples = vec![LogicSample::new(0, 0)];
    let mut push = |sample: LogicSample| {
        if samples.last().map(|s| s.pins) != Some(sample.pins) {
            samples.push(sample);
        }
    };

    let h = HVSP_HALF_PERIOD;
    let mut t = 2 * h;
    for &(sii, sdi, sdo) in words {
        for pos in 0..11u8 {
            let (sii_bit, sdi_bit) = if (1..=8).contains(&pos) {
                let shift = 8 - pos;
                ((sii >> shift) & 1 == 1, (sdi >> shift) & 1 == 1)
            } else {
                (false, false)
            };
            let sdo_bit = pos <= 7 && (sdo >> (7 - pos)) & 1 == 1;

            let low = [false, sii_bit, sdi_bit, sdo_bit];
            let high = [true, sii_bit, sdi_bit, sdo_bit];
            push(LogicSample::from_lines(&low, t));
            push(LogicSample::from_lines(&high, t + h));
            push(LogicSample::from_lines(&low, t + 2 * h));
            t += 4 * h;
        }
    }
    samples
}

/// Builder for a UART-style one-wire line.
///
/// The bit period may be fractional; edges land on the nearest sample, as
/// they would in a capture whose rate is not a multiple of the baud rate.
pub struct UartWave {
    period: f64,
    /// Position in samples, unrounded
    pos: f64,
    level: bool,
    samples: Vec<Sample>,
}

impl UartWave {
    /// Line idles high for two bit times before the first frame
    pub fn new(samples_per_bit: u64) -> Self {
        Self::with_period(samples_per_bit as f64)
    }

    pub fn with_period(period: f64) -> Self {
        Self {
            period,
            pos: 2.0 * period,
            level: true,
            samples: vec![Sample::new(true, 0)],
        }
    }

    fn set(&mut self, level: bool) {
        if level != self.level {
            self.samples.push(Sample::new(level, self.now()));
            self.level = level;
        }
    }

    fn bit(&mut self, level: bool) {
        self.set(level);
        self.pos += self.period;
    }

    /// One frame: start bit, 8 data bits LSB-first and two stop bits.
    /// `stop_ok` false drives the first stop bit low.
    pub fn frame(mut self, value: u8, stop_ok: bool) -> Self {
        self.bit(false);
        for idx in 0..8 {
            self.bit((value >> idx) & 1 == 1);
        }
        self.bit(stop_ok);
        self.bit(true);
        self
    }

    pub fn byte(self, value: u8) -> Self {
        self.frame(value, true)
    }

    pub fn bytes(self, values: &[u8]) -> Self {
        values.iter().fold(self, |wave, &v| wave.byte(v))
    }

    pub fn sync(self) -> Self {
        self.byte(0x55)
    }

    /// Hold the line high
    pub fn idle(mut self, samples: u64) -> Self {
        self.set(true);
        self.pos += samples as f64;
        self
    }

    /// Drive the line low for `samples`, then release it
    pub fn pulse_low(mut self, samples: u64) -> Self {
        self.set(false);
        self.pos += samples as f64;
        self.set(true);
        self.pos += self.period;
        self
    }

    /// Sample number the next frame would start at
    pub fn now(&self) -> u64 {
        self.pos.round() as u64
    }

    pub fn finish(self) -> Vec<Sample> {
        self.samples
    }
}

/// Within each annotation class, start times never go backwards
pub fn assert_ordered_per_class(annotations: &[Annotation]) {
    let mut last: HashMap<&str, u64> = HashMap::new();
    for ann in annotations {
        assert!(ann.start_time <= ann.end_time, "inverted interval: {}", ann);
        if let Some(&prev) = last.get(ann.class) {
            assert!(ann.start_time >= prev, "out of order: {}", ann);
        }
        last.insert(ann.class, ann.start_time);
    }
}
