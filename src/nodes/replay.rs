//! Replay source
//!
//! Feeds a recorded stream (line samples, SPI packets, annotations) into a
//! pipeline, one item per `work()` call, then ends the stream.

use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use std::collections::VecDeque;
use tracing::debug;

/// Source node with no inputs and a single output port named `out`
pub struct ReplaySource<T> {
    name: String,
    items: VecDeque<T>,
    sent: usize,
}

impl<T> ReplaySource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            name: "replay".to_string(),
            items: items.into(),
            sent: 0,
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Items not yet sent
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T: Clone + Send + 'static> ProcessNode for ReplaySource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<T>("out", 0, PortDirection::Output)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let output = outputs
            .first()
            .and_then(|p| p.get::<T>())
            .ok_or_else(|| WorkError::NodeError("Missing replay output".into()))?;

        let Some(item) = self.items.pop_front() else {
            debug!("[{}] Replayed {} items", self.name, self.sent);
            return Err(WorkError::Shutdown);
        };
        output.send(item)?;
        self.sent += 1;
        Ok(1)
    }
}
