//! Channel receiver with a per-channel putback buffer
//!
//! [`Receiver`] wraps a single `crossbeam_channel::Receiver<ChannelMessage<T>>`
//! with a putback buffer, providing `recv`, `peek` and `put_back`.
//! It transparently unwraps `ChannelMessage` and caches end-of-stream state so
//! subsequent calls return `Shutdown`.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;
use super::stream::Source;

/// A single crossbeam receiver with a putback buffer.
///
/// The buffer and end-of-stream flag are externally owned so they persist
/// across `work()` calls in the owning node and port.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
    buffer: &'a mut VecDeque<T>,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    pub fn new(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            eos,
        }
    }

    /// Block on the channel for one item, recording end-of-stream.
    fn pull(&mut self) -> WorkResult<T> {
        match self.receiver.recv() {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver - EndOfStream received");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                tracing::debug!("Receiver - channel disconnected, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Check if there are any buffered items.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl<T> Source<T> for Receiver<'_, T> {
    /// Blocking receive. Returns from the putback buffer first, then
    /// falls through to the underlying channel.
    fn recv(&mut self) -> WorkResult<T> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }
        self.pull()
    }

    /// Peek at the front item, blocking on the channel if the buffer is empty.
    fn peek(&mut self) -> WorkResult<&T> {
        if self.buffer.is_empty() {
            if self.eos.load(Ordering::Relaxed) {
                return Err(WorkError::Shutdown);
            }
            let item = self.pull()?;
            self.buffer.push_back(item);
        }
        self.buffer.front().ok_or(WorkError::Shutdown)
    }

    fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }
}
