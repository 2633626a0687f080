//! Runtime support for streaming node graphs

pub mod errors;
pub mod merge;
pub mod node;
pub mod pipeline;
pub mod ports;
pub mod receiver;
pub mod sample;
pub mod scheduler;
pub mod sender;
pub mod stream;
pub mod type_registry;

pub use errors::{ConnectionError, PipelineError, WorkError, WorkResult, until_shutdown};
pub use merge::ChannelMerger;
pub use node::ProcessNode;
pub use ports::{InputPort, OutputPort, Pipeline, PortDirection, PortSchema, register_type};
pub use receiver::Receiver;
pub use sample::{LogicSample, Sample};
pub use scheduler::Scheduler;
pub use sender::{ChannelMessage, Sender};
pub use stream::{Sink, Source};
