//! Annotation collector
//!
//! Sink node that gathers every annotation it receives into a shared vector,
//! so the caller can inspect the results after the pipeline finishes.

use crate::nodes::decoders::Annotation;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::ports::{PortDirection, PortSchema};
use crate::runtime::stream::Source;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::trace;

pub struct AnnotationCollector {
    name: String,
    collected: Arc<Mutex<Vec<Annotation>>>,
    buffer: VecDeque<Annotation>,
}

impl AnnotationCollector {
    pub fn new() -> Self {
        Self {
            name: "collector".to_string(),
            collected: Arc::new(Mutex::new(Vec::new())),
            buffer: VecDeque::new(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Shared view of the collected annotations, in arrival order
    pub fn handle(&self) -> Arc<Mutex<Vec<Annotation>>> {
        Arc::clone(&self.collected)
    }
}

impl Default for AnnotationCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessNode for AnnotationCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::new::<Annotation>("annotations", 0, PortDirection::Input)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let annotation = inputs
            .first()
            .and_then(|p| p.get::<Annotation>(&mut self.buffer))
            .ok_or_else(|| WorkError::NodeError("Missing annotation input".into()))?
            .recv()?;

        trace!("[{}] {}", self.name, annotation);
        self.collected
            .lock()
            .map_err(|_| WorkError::NodeError("Collector poisoned".into()))?
            .push(annotation);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::ReplaySource;
    use crate::nodes::decoders::{HvspDecoder, Max7219Decoder, SpiPacket, SpiWord, UpdiDecoder};
    use crate::runtime::{Pipeline, Sample};
    use crate::testutil::{UartWave, hvsp_session};

    fn collect(pipeline: Pipeline, handle: &Arc<Mutex<Vec<Annotation>>>) -> Vec<Annotation> {
        pipeline.build().unwrap().wait().unwrap();
        handle.lock().unwrap().clone()
    }

    #[test]
    fn test_collects_in_arrival_order() {
        let annotations = vec![
            Annotation::warning(0, 4, "first"),
            Annotation::warning(2, 3, "second"),
        ];
        let collector = AnnotationCollector::new();
        let handle = collector.handle();

        let mut pipeline = Pipeline::new();
        pipeline
            .add_process("replay", ReplaySource::new(annotations.clone()))
            .unwrap();
        pipeline.add_process("collector", collector).unwrap();
        pipeline
            .connect("replay", "out", "collector", "annotations")
            .unwrap();

        assert_eq!(collect(pipeline, &handle), annotations);
    }

    #[test]
    fn test_updi_pipeline_matches_direct_decode() {
        const RATE: u64 = 8_000_000;
        let samples = UartWave::new(40)
            .sync()
            .bytes(&[0x80, 0x30])
            .sync()
            .bytes(&[0x04, 0x00, 0x0F, 0x1E])
            .finish();

        let mut direct = Vec::new();
        let mut source: VecDeque<Sample> = samples.clone().into();
        UpdiDecoder::new()
            .with_samplerate(RATE)
            .decode(&mut source, &mut direct)
            .unwrap();

        let collector = AnnotationCollector::new();
        let handle = collector.handle();
        let mut pipeline = Pipeline::new();
        pipeline.add_process("line", ReplaySource::new(samples)).unwrap();
        pipeline
            .add_process("updi", UpdiDecoder::new().with_samplerate(RATE))
            .unwrap();
        pipeline.add_process("collector", collector).unwrap();
        pipeline.connect("line", "out", "updi", "updi").unwrap();
        pipeline
            .connect("updi", "annotations", "collector", "annotations")
            .unwrap();

        let piped = collect(pipeline, &handle);
        assert!(piped.iter().any(|a| a.text() == "LDS 0F00 <- 1E"));
        assert_eq!(piped, direct);
    }

    #[test]
    fn test_hvsp_pipeline_merges_four_lines() {
        let session = hvsp_session(&[(0x0C, 0x34, 0), (0x1C, 0x12, 0)]);

        let mut direct = Vec::new();
        let mut source: VecDeque<_> = session.clone().into();
        HvspDecoder::new().decode(&mut source, &mut direct).unwrap();

        let collector = AnnotationCollector::new();
        let handle = collector.handle();
        let mut pipeline = Pipeline::new();
        pipeline.add_process("hvsp", HvspDecoder::new()).unwrap();
        pipeline.add_process("collector", collector).unwrap();
        pipeline
            .connect("hvsp", "annotations", "collector", "annotations")
            .unwrap();

        for (line, port) in ["sci", "sii", "sdi", "sdo"].into_iter().enumerate() {
            let mut edges: Vec<Sample> = Vec::new();
            for s in &session {
                if edges.last().map(|e| e.value) != Some(s.pin(line)) {
                    edges.push(Sample::new(s.pin(line), s.start_time));
                }
            }
            pipeline.add_process(port, ReplaySource::new(edges)).unwrap();
            pipeline.connect(port, "out", "hvsp", port).unwrap();
        }

        let piped = collect(pipeline, &handle);
        assert!(piped.iter().any(|a| a.text() == "LHA 12"));
        assert_eq!(piped, direct);
    }

    #[test]
    fn test_spi_pipeline() {
        let word = |v, t| SpiWord::new(v, t, t + 8);
        let packets = vec![
            SpiPacket::CsChange {
                active: true,
                start_time: 0,
                end_time: 0,
            },
            SpiPacket::Data {
                mosi: word(0x0C, 1),
                miso: None,
            },
            SpiPacket::Data {
                mosi: word(0x01, 9),
                miso: None,
            },
            SpiPacket::CsChange {
                active: false,
                start_time: 18,
                end_time: 18,
            },
        ];

        let collector = AnnotationCollector::new();
        let handle = collector.handle();
        let mut pipeline = Pipeline::new();
        pipeline.add_process("spi", ReplaySource::new(packets)).unwrap();
        pipeline.add_process("max7219", Max7219Decoder::new()).unwrap();
        pipeline.add_process("collector", collector).unwrap();
        pipeline.connect("spi", "out", "max7219", "spi").unwrap();
        pipeline
            .connect("max7219", "annotations", "collector", "annotations")
            .unwrap();

        let texts: Vec<String> = collect(pipeline, &handle)
            .iter()
            .map(|a| a.text().to_string())
            .collect();
        assert_eq!(texts, vec!["Shutdown: off"]);
    }
}
