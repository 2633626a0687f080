//! Forward-only time cursor over a run-length single-line stream

use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::sample::Sample;
use crate::runtime::stream::Source;

/// Which transition `wait_edge` stops at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Falling,
    Rising,
    Either,
}

impl Edge {
    fn matches(self, new_level: bool) -> bool {
        match self {
            Edge::Falling => !new_level,
            Edge::Rising => new_level,
            Edge::Either => true,
        }
    }
}

/// Current position (sample number) and line level.
///
/// The cursor never moves backwards. A sample starting exactly at the
/// position is left unconsumed, so an edge landing on the end of a skip is
/// still seen by the next `wait_edge`.
#[derive(Debug, Default, Clone)]
pub struct LineCursor {
    now: u64,
    level: bool,
    primed: bool,
}

impl LineCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    fn prime<S: Source<Sample>>(&mut self, source: &mut S) -> WorkResult {
        if !self.primed {
            let first = source.recv()?;
            self.now = first.start_time;
            self.level = first.value;
            self.primed = true;
        }
        Ok(())
    }

    fn peek_next<S: Source<Sample>>(source: &mut S) -> WorkResult<Option<Sample>> {
        match source.peek() {
            Ok(sample) => Ok(Some(*sample)),
            Err(WorkError::Shutdown) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Scan forward to the next matching edge.
    ///
    /// With a `budget`, gives up once that many samples have elapsed: the
    /// cursor is left at the deadline and `Ok(false)` is returned. Reaching
    /// the end of the stream is `Err(WorkError::Shutdown)`.
    pub fn wait_edge<S: Source<Sample>>(
        &mut self,
        source: &mut S,
        edge: Edge,
        budget: Option<u64>,
    ) -> WorkResult<bool> {
        self.prime(source)?;
        let deadline = budget.map(|b| self.now.saturating_add(b));

        loop {
            let next = *source.peek()?;
            if let Some(deadline) = deadline
                && next.start_time > deadline
            {
                self.now = deadline;
                return Ok(false);
            }
            source.recv()?;

            if next.value == self.level {
                continue;
            }
            self.level = next.value;
            self.now = next.start_time.max(self.now);
            if edge.matches(next.value) {
                return Ok(true);
            }
        }
    }

    /// Advance by `count` samples and return the line level there.
    ///
    /// Past the end of the stream the last level holds.
    pub fn skip<S: Source<Sample>>(&mut self, source: &mut S, count: u64) -> WorkResult<bool> {
        self.prime(source)?;
        let target = self.now + count;

        while let Some(next) = Self::peek_next(source)? {
            if next.start_time > target {
                break;
            }
            if next.start_time == target {
                self.now = target;
                return Ok(next.value);
            }
            source.recv()?;
            self.level = next.value;
        }

        self.now = target;
        Ok(self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn line(edges: &[(u64, bool)]) -> VecDeque<Sample> {
        edges.iter().map(|&(t, v)| Sample::new(v, t)).collect()
    }

    #[test]
    fn test_wait_edge_kinds() {
        let mut src = line(&[(0, true), (10, false), (20, true), (30, false)]);
        let mut cursor = LineCursor::new();

        assert!(cursor.wait_edge(&mut src, Edge::Rising, None).unwrap());
        assert_eq!(cursor.now(), 20);
        assert!(cursor.wait_edge(&mut src, Edge::Either, None).unwrap());
        assert_eq!(cursor.now(), 30);
        assert!(matches!(
            cursor.wait_edge(&mut src, Edge::Either, None),
            Err(WorkError::Shutdown)
        ));
    }

    #[test]
    fn test_wait_edge_budget() {
        let mut src = line(&[(0, true), (100, false)]);
        let mut cursor = LineCursor::new();

        assert!(!cursor.wait_edge(&mut src, Edge::Falling, Some(40)).unwrap());
        assert_eq!(cursor.now(), 40);
        assert!(cursor.wait_edge(&mut src, Edge::Falling, Some(60)).unwrap());
        assert_eq!(cursor.now(), 100);
    }

    #[test]
    fn test_duplicate_levels_are_not_edges() {
        let mut src = line(&[(0, true), (5, true), (9, false)]);
        let mut cursor = LineCursor::new();

        assert!(cursor.wait_edge(&mut src, Edge::Either, None).unwrap());
        assert_eq!(cursor.now(), 9);
    }

    #[test]
    fn test_skip_leaves_edge_at_target() {
        let mut src = line(&[(0, true), (10, false), (20, true)]);
        let mut cursor = LineCursor::new();

        assert!(cursor.skip(&mut src, 5).unwrap());
        assert!(!cursor.skip(&mut src, 5).unwrap());
        assert_eq!(cursor.now(), 10);
        assert!(cursor.wait_edge(&mut src, Edge::Falling, None).unwrap());
        assert_eq!(cursor.now(), 10);

        // Past the end the last level holds
        assert!(cursor.skip(&mut src, 1000).unwrap());
        assert_eq!(cursor.now(), 1010);
    }
}
