//! Broadcast sender with end-of-stream signaling

use crossbeam_channel::{SendError, Sender as CrossbeamSender};

use super::errors::WorkResult;
use super::stream::Sink;

/// Channel message wrapper for end-of-stream signaling
///
/// Wraps data flowing through channels so sources can explicitly signal
/// when no more data will be sent. Nodes never see this enum directly:
/// `Sender::send()` wraps values in `Item(T)` and `Receiver::recv()`
/// unwraps them transparently.
#[derive(Clone, Debug)]
pub enum ChannelMessage<T> {
    /// A data item
    Item(T),
    /// End-of-stream marker, no more data will be sent
    EndOfStream,
}

/// Broadcast sender that sends to one or more consumers
///
/// Sends directly from the caller's thread to every destination in turn.
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<ChannelMessage<T>>>,
}

impl<T: Clone> Sender<T> {
    /// Create a new Sender from a vector of crossbeam senders
    pub fn new(destinations: Vec<CrossbeamSender<ChannelMessage<T>>>) -> Self {
        Self { destinations }
    }

    /// Get the number of broadcast destinations
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    /// Send a value to all destinations
    ///
    /// Fails only if no destination accepted the value.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.destinations.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        let mut last_error = None;

        for dest in &self.destinations {
            match dest.send(ChannelMessage::Item(value.clone())) {
                Ok(()) => any_success = true,
                Err(SendError(msg)) => {
                    if let ChannelMessage::Item(v) = msg {
                        last_error = Some(SendError(v));
                    }
                }
            }
        }

        if !any_success && let Some(e) = last_error {
            return Err(e);
        }

        Ok(())
    }

    /// Signal end-of-stream to all destinations
    ///
    /// Downstream `Receiver`s return `WorkError::Shutdown` once they reach
    /// the marker. Disconnected destinations are skipped.
    pub fn close(&self) {
        for dest in &self.destinations {
            let _ = dest.send(ChannelMessage::EndOfStream);
        }
    }

    /// Check if this sender has any connected receivers
    pub fn is_connected(&self) -> bool {
        !self.destinations.is_empty()
    }
}

impl<T: Clone> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
        }
    }
}

impl<T: Clone> Sink<T> for Sender<T> {
    fn emit(&mut self, item: T) -> WorkResult {
        Ok(Sender::send(self, item)?)
    }
}
