//! Time-ordered merge of per-line edge streams into pin-vectors
//!
//! Sources deliver one run-length [`Sample`] stream per line. Decoders that
//! look at several lines at once want a single stream of [`LogicSample`]s, so
//! the merger repeatedly takes the earliest pending edge across all lines and
//! applies every edge that shares its sample number.

use super::errors::{WorkError, WorkResult};
use super::sample::{LogicSample, Sample};
use super::stream::Source;

/// Combines up to 16 single-line streams; line `n` becomes pin bit `n`.
#[derive(Debug, Default, Clone)]
pub struct ChannelMerger {
    pins: u16,
}

impl ChannelMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pin-vector (levels as of the last merged sample)
    pub fn pins(&self) -> u16 {
        self.pins
    }

    fn next_time<S: Source<Sample>>(channel: &mut S) -> WorkResult<Option<u64>> {
        match channel.peek() {
            Ok(sample) => Ok(Some(sample.start_time)),
            Err(WorkError::Shutdown) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Produce the next pin-vector.
    ///
    /// Lines whose stream has ended hold their last level. Returns
    /// `Err(WorkError::Shutdown)` once every line is exhausted.
    pub fn next<S: Source<Sample>>(&mut self, channels: &mut [S]) -> WorkResult<LogicSample> {
        let mut earliest: Option<u64> = None;
        for channel in channels.iter_mut() {
            if let Some(t) = Self::next_time(channel)? {
                earliest = Some(earliest.map_or(t, |e| e.min(t)));
            }
        }
        let time = earliest.ok_or(WorkError::Shutdown)?;

        for (line, channel) in channels.iter_mut().enumerate() {
            while let Some(t) = Self::next_time(channel)? {
                if t > time {
                    break;
                }
                let sample = channel.recv()?;
                if sample.value {
                    self.pins |= 1 << line;
                } else {
                    self.pins &= !(1 << line);
                }
            }
        }

        Ok(LogicSample::new(self.pins, time))
    }
}
