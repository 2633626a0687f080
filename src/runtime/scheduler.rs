//! Thread-per-node scheduler for streaming graphs
//!
//! Spawns a dedicated thread for each node and calls `work()` in a loop until
//! the node stops. Dropping a node's ports when its thread ends disconnects
//! its channels, which downstream receivers observe as end-of-stream.

use super::errors::{PipelineError, WorkError};
use super::node::ProcessNode;
use super::ports::{InputPort, OutputPort};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Completion report sent by each node thread: name and failure, if any
type Completion = (String, Option<String>);

/// Runtime scheduler that executes a streaming graph
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<()>)>,
    completion_tx: StdSender<Completion>,
    completion_rx: StdReceiver<Completion>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel();
        Self {
            threads: Vec::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Start a process node in its own thread
    pub fn start_process(
        &mut self,
        mut node: Box<dyn ProcessNode>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) {
        let completion_tx = self.completion_tx.clone();
        let name = node.name().to_string();
        let thread_name = name.clone();

        debug!("Starting process node: {}", name);

        let handle = thread::spawn(move || {
            let mut items_produced = 0usize;
            let mut failure = None;

            loop {
                match node.work(&inputs, &outputs) {
                    Ok(n) => items_produced += n,
                    Err(WorkError::Shutdown) => break,
                    Err(e) => {
                        error!("[{}] Work error: {}", thread_name, e);
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }

            info!("[{}] Shutdown. Produced {} items.", thread_name, items_produced);

            // Close channels before reporting so downstream sees end-of-stream
            drop(outputs);
            drop(inputs);
            drop(node);

            let _ = completion_tx.send((thread_name, failure));
        });

        self.threads.push((name, handle));
    }

    /// Wait for all node threads to complete.
    ///
    /// Returns the first node failure, if any node ended with an error other
    /// than end-of-stream.
    pub fn wait(self) -> Result<(), PipelineError> {
        let Scheduler {
            threads,
            completion_tx,
            completion_rx,
            ..
        } = self;

        // Drop our sender so the channel closes when all threads complete
        drop(completion_tx);

        let total_threads = threads.len();
        let mut completed = 0;
        let mut first_failure = None;
        let mut threads_by_name: HashMap<String, JoinHandle<()>> = threads.into_iter().collect();

        info!("Waiting for {} threads to complete...", total_threads);

        while completed < total_threads {
            let Ok((thread_name, failure)) = completion_rx.recv() else {
                break;
            };
            completed += 1;
            if let Some(handle) = threads_by_name.remove(&thread_name)
                && let Err(e) = handle.join()
            {
                error!("[{}] Thread panicked: {:?}", thread_name, e);
            }
            if let Some(reason) = failure {
                first_failure.get_or_insert(PipelineError::NodeFailed {
                    node: thread_name,
                    reason,
                });
            }
        }

        info!("All {} threads completed", total_threads);

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Get the number of running threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Get the names of all running threads
    pub fn thread_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
