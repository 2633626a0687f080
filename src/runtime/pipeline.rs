//! Pipeline builder for constructing node graphs
//!
//! Nodes are added by name, connected by port name, and type-checked against
//! their [`PortSchema`]s. [`Pipeline::build`] creates the channels and hands
//! every node to a [`Scheduler`].

use super::errors::{ConnectionError, PipelineError};
use super::node::{InputPort, OutputPort, ProcessNode};
use super::ports::PortSchema;
use super::scheduler::Scheduler;
use super::type_registry::TYPE_REGISTRY;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::{debug, info};

/// Pipeline builder that manages nodes and connections
pub struct Pipeline {
    nodes: Vec<(usize, Box<dyn ProcessNode>)>,
    node_names: HashMap<String, usize>,
    node_schemas: HashMap<usize, (Vec<PortSchema>, Vec<PortSchema>)>,
    connections: Vec<PendingConnection>,
    next_id: usize,
    default_buffer_size: usize,
}

struct PendingConnection {
    from_node: usize,
    from_port: usize,
    to_node: usize,
    to_port: usize,
    type_id: TypeId,
    buffer_size: usize,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_names: HashMap::new(),
            node_schemas: HashMap::new(),
            connections: Vec::new(),
            next_id: 0,
            default_buffer_size: 1000,
        }
    }

    /// Set the default buffer size for connections
    pub fn with_default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }

    /// Add a process node by name (ports are taken from the node's schema)
    pub fn add_process<N: ProcessNode + 'static>(
        &mut self,
        name: impl Into<String>,
        node: N,
    ) -> Result<(), PipelineError> {
        let name = name.into();

        if self.node_names.contains_key(&name) {
            return Err(PipelineError::DuplicateNode(name));
        }

        let id = self.next_id;
        self.next_id += 1;

        self.node_schemas
            .insert(id, (node.input_schema(), node.output_schema()));
        self.node_names.insert(name, id);
        self.nodes.push((id, Box::new(node)));

        Ok(())
    }

    /// Connect two nodes by name and port name
    pub fn connect(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<(), ConnectionError> {
        self.connect_with_buffer(from_node, from_port, to_node, to_port, self.default_buffer_size)
    }

    /// Connect with custom buffer size
    pub fn connect_with_buffer(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
        buffer_size: usize,
    ) -> Result<(), ConnectionError> {
        let from_schema = self.find_port(from_node, from_port, false)?;
        let to_schema = self.find_port(to_node, to_port, true)?;
        let from_id = self.node_names[from_node];
        let to_id = self.node_names[to_node];

        if from_schema.type_id != to_schema.type_id {
            return Err(ConnectionError::TypeMismatch {
                from_node: from_node.to_string(),
                from_port: from_port.to_string(),
                from_type: from_schema.type_id,
                to_node: to_node.to_string(),
                to_port: to_port.to_string(),
                to_type: to_schema.type_id,
            });
        }

        // An input port has exactly one producer; outputs may fan out
        if self
            .connections
            .iter()
            .any(|c| c.to_node == to_id && c.to_port == to_schema.index)
        {
            return Err(ConnectionError::DuplicateConnection {
                node: to_node.to_string(),
                port: to_port.to_string(),
            });
        }

        self.connections.push(PendingConnection {
            from_node: from_id,
            from_port: from_schema.index,
            to_node: to_id,
            to_port: to_schema.index,
            type_id: from_schema.type_id,
            buffer_size,
        });

        Ok(())
    }

    fn find_port(&self, node: &str, port: &str, input: bool) -> Result<PortSchema, ConnectionError> {
        let (inputs, outputs) = self
            .node_names
            .get(node)
            .and_then(|id| self.node_schemas.get(id))
            .ok_or_else(|| ConnectionError::NodeNotFound(node.to_string()))?;
        let ports = if input { inputs } else { outputs };
        ports
            .iter()
            .find(|s| s.name == port)
            .cloned()
            .ok_or_else(|| ConnectionError::PortNotFound {
                node: node.to_string(),
                port: port.to_string(),
            })
    }

    /// List all input ports for a node by name
    pub fn list_node_inputs(&self, name: &str) -> Result<&[PortSchema], ConnectionError> {
        self.schemas(name).map(|(inputs, _)| inputs.as_slice())
    }

    /// List all output ports for a node by name
    pub fn list_node_outputs(&self, name: &str) -> Result<&[PortSchema], ConnectionError> {
        self.schemas(name).map(|(_, outputs)| outputs.as_slice())
    }

    fn schemas(&self, name: &str) -> Result<&(Vec<PortSchema>, Vec<PortSchema>), ConnectionError> {
        self.node_names
            .get(name)
            .and_then(|id| self.node_schemas.get(id))
            .ok_or_else(|| ConnectionError::NodeNotFound(name.to_string()))
    }

    /// List all node names
    pub fn list_nodes(&self) -> Vec<&str> {
        self.node_names.keys().map(|s| s.as_str()).collect()
    }

    /// Build the pipeline and return a running scheduler
    pub fn build(mut self) -> Result<Scheduler, PipelineError> {
        info!(
            "Building pipeline with {} nodes and {} connections",
            self.nodes.len(),
            self.connections.len()
        );

        let mut scheduler = Scheduler::new();
        let registry = TYPE_REGISTRY.lock().unwrap();

        // Phase 1: Create all channels, accumulating receivers and senders
        type PortKey = (usize, usize);
        let mut receivers: HashMap<PortKey, Box<dyn Any + Send>> = HashMap::new();
        let mut senders: HashMap<PortKey, (TypeId, Vec<Box<dyn Any + Send>>)> = HashMap::new();

        for conn in &self.connections {
            let (tx, rx) = registry
                .create_channel(conn.type_id, conn.buffer_size)
                .ok_or(PipelineError::UnregisteredType(conn.type_id))?;

            receivers.insert((conn.to_node, conn.to_port), rx);
            senders
                .entry((conn.from_node, conn.from_port))
                .or_insert_with(|| (conn.type_id, Vec::new()))
                .1
                .push(tx);
        }

        // Phase 2: Wrap the ports of every node before starting any thread
        let mut ready = Vec::with_capacity(self.nodes.len());
        for (node_id, node) in self.nodes.drain(..) {
            debug!("Preparing node {}: {}", node_id, node.name());

            // Unconnected inputs are allowed; the node sees `get()` return None
            let input_ports: Vec<_> = (0..node.num_inputs())
                .map(|i| {
                    let channel = receivers
                        .remove(&(node_id, i))
                        .unwrap_or_else(|| Box::new(()) as Box<dyn Any + Send>);
                    InputPort::from_type_erased(channel)
                })
                .collect();

            let mut output_ports = Vec::with_capacity(node.num_outputs());
            for i in 0..node.num_outputs() {
                let channel = match senders.remove(&(node_id, i)) {
                    Some((type_id, list)) => registry
                        .wrap_output(type_id, list)
                        .ok_or(PipelineError::UnregisteredType(type_id))?,
                    None => Box::new(()) as Box<dyn Any + Send>,
                };
                output_ports.push(OutputPort::from_type_erased(channel));
            }

            ready.push((node, input_ports, output_ports));
        }
        drop(registry);

        for (node, inputs, outputs) in ready {
            scheduler.start_process(node, inputs, outputs);
        }

        info!(
            "Pipeline built successfully with {} threads",
            scheduler.num_threads()
        );
        Ok(scheduler)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::WorkResult;
    use crate::runtime::ports::PortDirection;
    use crate::runtime::sample::Sample;

    struct TestSource;
    impl ProcessNode for TestSource {
        fn name(&self) -> &str {
            "test_source"
        }
        fn num_inputs(&self) -> usize {
            0
        }
        fn num_outputs(&self) -> usize {
            1
        }
        fn output_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::new::<Sample>("out", 0, PortDirection::Output)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Err(crate::runtime::errors::WorkError::Shutdown)
        }
    }

    struct TestSink;
    impl ProcessNode for TestSink {
        fn name(&self) -> &str {
            "test_sink"
        }
        fn num_inputs(&self) -> usize {
            1
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn input_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::new::<Sample>("in", 0, PortDirection::Input)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Err(crate::runtime::errors::WorkError::Shutdown)
        }
    }

    struct TextSink;
    impl ProcessNode for TextSink {
        fn name(&self) -> &str {
            "text_sink"
        }
        fn num_inputs(&self) -> usize {
            1
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn input_schema(&self) -> Vec<PortSchema> {
            vec![PortSchema::new::<String>("in", 0, PortDirection::Input)]
        }
        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Err(crate::runtime::errors::WorkError::Shutdown)
        }
    }

    #[test]
    fn test_single_connection() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", TestSource).unwrap();
        pipeline.add_process("sink", TestSink).unwrap();

        assert!(pipeline.connect("source", "out", "sink", "in").is_ok());
    }

    #[test]
    fn test_duplicate_input_connection_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source1", TestSource).unwrap();
        pipeline.add_process("source2", TestSource).unwrap();
        pipeline.add_process("sink", TestSink).unwrap();

        pipeline.connect("source1", "out", "sink", "in").unwrap();

        let result = pipeline.connect("source2", "out", "sink", "in");
        assert!(matches!(result, Err(ConnectionError::DuplicateConnection { .. })));
        assert!(result.unwrap_err().to_string().contains("already connected"));
    }

    #[test]
    fn test_multiple_output_connections_allowed() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", TestSource).unwrap();
        pipeline.add_process("sink1", TestSink).unwrap();
        pipeline.add_process("sink2", TestSink).unwrap();

        assert!(pipeline.connect("source", "out", "sink1", "in").is_ok());
        assert!(pipeline.connect("source", "out", "sink2", "in").is_ok());
    }

    #[test]
    fn test_connection_errors() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", TestSource).unwrap();
        pipeline.add_process("sink", TestSink).unwrap();
        pipeline.add_process("text", TextSink).unwrap();

        assert!(matches!(
            pipeline.connect("source", "out", "nonexistent", "in"),
            Err(ConnectionError::NodeNotFound(_))
        ));
        assert!(matches!(
            pipeline.connect("source", "wrong_port", "sink", "in"),
            Err(ConnectionError::PortNotFound { .. })
        ));
        assert!(matches!(
            pipeline.connect("source", "out", "text", "in"),
            Err(ConnectionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_node_name_rejected() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.add_process("node1", TestSource).is_ok());
        let result = pipeline.add_process("node1", TestSource);
        assert!(matches!(result, Err(PipelineError::DuplicateNode(_))));
    }

    #[test]
    fn test_list_nodes_and_ports() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("source", TestSource).unwrap();
        pipeline.add_process("sink", TestSink).unwrap();

        let nodes = pipeline.list_nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.contains(&"source"));
        assert_eq!(pipeline.list_node_outputs("source").unwrap()[0].name, "out");
        assert!(pipeline.list_node_inputs("source").unwrap().is_empty());
        assert!(pipeline.list_node_inputs("missing").is_err());
    }

    #[test]
    fn test_unregistered_type_fails_build() {
        let mut pipeline = Pipeline::new();
        pipeline.add_process("sink", TextSink).unwrap();
        pipeline.add_process("sink2", TextSink).unwrap();

        struct TextSource;
        impl ProcessNode for TextSource {
            fn name(&self) -> &str {
                "text_source"
            }
            fn num_inputs(&self) -> usize {
                0
            }
            fn num_outputs(&self) -> usize {
                1
            }
            fn output_schema(&self) -> Vec<PortSchema> {
                vec![PortSchema::new::<String>("out", 0, PortDirection::Output)]
            }
            fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
                Err(crate::runtime::errors::WorkError::Shutdown)
            }
        }
        pipeline.add_process("source", TextSource).unwrap();
        pipeline.connect("source", "out", "sink", "in").unwrap();

        assert!(matches!(pipeline.build(), Err(PipelineError::UnregisteredType(_))));
    }

    #[test]
    fn test_build_and_run_empty_nodes() {
        let mut pipeline = Pipeline::new().with_default_buffer_size(8);
        pipeline.add_process("source", TestSource).unwrap();
        pipeline.add_process("sink", TestSink).unwrap();
        pipeline.connect("source", "out", "sink", "in").unwrap();

        let scheduler = pipeline.build().unwrap();
        assert_eq!(scheduler.num_threads(), 2);
        scheduler.wait().unwrap();
    }
}
