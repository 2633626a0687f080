//! Port schemas and type-erased channel endpoints
//!
//! [`PortSchema`] describes a node's named, typed ports; [`InputPort`] and
//! [`OutputPort`] hold the channel endpoints the pipeline created for them.

use crossbeam_channel::Receiver as CrossbeamReceiver;
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::AtomicBool;

pub use super::pipeline::Pipeline;
pub use super::receiver::Receiver;
pub use super::sender::{ChannelMessage, Sender};
pub use super::type_registry::register_type;

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Schema describing a port's metadata
#[derive(Debug, Clone)]
pub struct PortSchema {
    pub name: String,
    pub type_id: TypeId,
    pub index: usize,
    pub direction: PortDirection,
}

impl PortSchema {
    /// Create a new port schema with type information
    pub fn new<T: 'static>(name: impl Into<String>, index: usize, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            index,
            direction,
        }
    }
}

/// Type-erased input port wrapping a crossbeam receiver
pub struct InputPort {
    channel: Box<dyn Any + Send>,
    eos: AtomicBool,
}

impl InputPort {
    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self {
            channel,
            eos: AtomicBool::new(false),
        }
    }

    /// Create a port around an existing channel (for tests and hand-wired nodes).
    pub fn from_receiver<T: Send + 'static>(receiver: CrossbeamReceiver<ChannelMessage<T>>) -> Self {
        Self::from_type_erased(Box::new(receiver))
    }

    /// Get a Receiver over this port, using `buffer` for putback.
    ///
    /// Returns None if the port is unconnected or carries another type.
    pub fn get<'a, T: Send + 'static>(&'a self, buffer: &'a mut VecDeque<T>) -> Option<Receiver<'a, T>> {
        let receiver = self
            .channel
            .downcast_ref::<CrossbeamReceiver<ChannelMessage<T>>>()?;
        Some(Receiver::new(receiver, buffer, &self.eos))
    }
}

/// Type-erased output port wrapping a broadcast [`Sender`]
pub struct OutputPort {
    channel: Box<dyn Any + Send>,
}

impl OutputPort {
    /// Create from type-erased box (for internal use by Pipeline).
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self { channel }
    }

    /// Create a port around an existing sender (for tests and hand-wired nodes).
    pub fn from_sender<T: Send + Clone + 'static>(sender: Sender<T>) -> Self {
        Self::from_type_erased(Box::new(sender))
    }

    /// Get an owned Sender (cheaply cloned from internal storage).
    ///
    /// Returns None if the port is unconnected or carries another type.
    pub fn get<T: Send + Clone + 'static>(&self) -> Option<Sender<T>> {
        self.channel.downcast_ref::<Sender<T>>().cloned()
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InputPort")
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OutputPort")
    }
}
