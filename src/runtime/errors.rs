//! Error types for the runtime system

use crate::DecodeError;
use crossbeam_channel::{RecvError, SendError};
use std::any::TypeId;

/// Error type for connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Type mismatch: {from_node}.{from_port} ({from_type:?}) -> {to_node}.{to_port} ({to_type:?})")]
    TypeMismatch {
        from_node: String,
        from_port: String,
        from_type: TypeId,
        to_node: String,
        to_port: String,
        to_type: TypeId,
    },

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    #[error("Input port '{port}' on node '{node}' is already connected")]
    DuplicateConnection { node: String, port: String },
}

/// Error type for building and running a pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Node with name '{0}' already exists")]
    DuplicateNode(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Type {0:?} not registered. Call register_type::<T>() before building pipeline.")]
    UnregisteredType(TypeId),

    #[error("Node '{node}' failed: {reason}")]
    NodeFailed { node: String, reason: String },
}

/// Error type for work function operations
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Failed to receive from input channel: {0}")]
    RecvError(#[from] RecvError),

    #[error("Failed to send to output channel: {0}")]
    SendError(String),

    #[error("Node-specific error: {0}")]
    NodeError(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// End of the input stream. Not a failure: decoders return it once
    /// there is nothing left to consume.
    #[error("Shutdown signal received")]
    Shutdown,
}

impl<T> From<SendError<T>> for WorkError {
    fn from(e: SendError<T>) -> Self {
        WorkError::SendError(format!("{}", e))
    }
}

impl WorkError {
    /// Whether this error is the normal end-of-stream condition
    pub fn is_shutdown(&self) -> bool {
        matches!(self, WorkError::Shutdown)
    }
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;

/// Turn the end-of-stream condition into a clean `Ok`.
///
/// Decode loops run until their source is exhausted; every other error
/// is passed through.
pub fn until_shutdown(result: WorkResult) -> WorkResult {
    match result {
        Err(WorkError::Shutdown) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_clean_end() {
        assert!(until_shutdown(Err(WorkError::Shutdown)).is_ok());
        assert!(until_shutdown(Err(WorkError::NodeError("x".into()))).is_err());
    }

    #[test]
    fn test_decode_error_converts() {
        let err: WorkError = DecodeError::MissingSampleRate.into();
        assert!(matches!(err, WorkError::Decode(DecodeError::MissingSampleRate)));
        assert!(!err.is_shutdown());
    }
}
