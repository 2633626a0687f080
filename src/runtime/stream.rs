//! Pull/push seams between decoders and whatever drives them
//!
//! Decoders read through a [`Source`] and write through a [`Sink`]. Inside a
//! pipeline these are a runtime [`Receiver`](super::Receiver) and
//! [`Sender`](super::Sender); called directly they are a `VecDeque` of
//! prepared input and a `Vec` collecting the output.

use std::collections::VecDeque;

use super::errors::{WorkError, WorkResult};

/// A blocking, ordered input stream with one-item lookahead and putback
pub trait Source<T> {
    /// Take the next item. Returns `Err(WorkError::Shutdown)` at end of stream.
    fn recv(&mut self) -> WorkResult<T>;

    /// Look at the next item without consuming it.
    fn peek(&mut self) -> WorkResult<&T>;

    /// Push an item back so the next `recv()` returns it.
    fn put_back(&mut self, item: T);
}

/// An output stream of decoded items
pub trait Sink<T> {
    fn emit(&mut self, item: T) -> WorkResult;
}

impl<T> Source<T> for VecDeque<T> {
    fn recv(&mut self) -> WorkResult<T> {
        self.pop_front().ok_or(WorkError::Shutdown)
    }

    fn peek(&mut self) -> WorkResult<&T> {
        self.front().ok_or(WorkError::Shutdown)
    }

    fn put_back(&mut self, item: T) {
        self.push_front(item);
    }
}

impl<T> Sink<T> for Vec<T> {
    fn emit(&mut self, item: T) -> WorkResult {
        self.push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vecdeque_source() {
        let mut src: VecDeque<u32> = VecDeque::from(vec![1, 2]);
        assert_eq!(*src.peek().unwrap(), 1);
        assert_eq!(src.recv().unwrap(), 1);
        src.put_back(9);
        assert_eq!(src.recv().unwrap(), 9);
        assert_eq!(src.recv().unwrap(), 2);
        assert!(matches!(src.recv(), Err(WorkError::Shutdown)));
        assert!(matches!(src.peek(), Err(WorkError::Shutdown)));
    }
}
