//! Decode a synthetic UPDI session through a pipeline and print the result.
//!
//! Run with `RUST_LOG=debug` to see the decoder's sync and stats logging.

use dsl::{AnnotationCollector, AnnotationKind, Pipeline, ReplaySource, Sample, UpdiDecoder};
use tracing_subscriber::EnvFilter;

const SAMPLERATE: u64 = 10_000_000;
const SAMPLES_PER_BIT: u64 = 87;

/// Line levels for a sequence of UART frames (start, 8 data bits LSB-first, 2 stop)
fn waveform(frames: &[u8]) -> Vec<Sample> {
    let mut samples = vec![Sample::new(true, 0)];
    let mut level = true;
    let mut t = 4 * SAMPLES_PER_BIT;
    let mut drive = |value: bool, t: u64| {
        if value != level {
            samples.push(Sample::new(value, t));
            level = value;
        }
    };

    for &byte in frames {
        let bits = std::iter::once(false)
            .chain((0..8).map(|i| (byte >> i) & 1 == 1))
            .chain([true, true]);
        for bit in bits {
            drive(bit, t);
            t += SAMPLES_PER_BIT;
        }
    }
    samples
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // LDCS STATUSA, READSIB (16 bytes), STS 0x1000 = 0xAB
    let mut frames = vec![0x55, 0x80, 0x30, 0x55, 0xE5];
    frames.extend_from_slice(b"tinyAVR P:0D:0-3");
    frames.extend_from_slice(&[0x55, 0x44, 0x00, 0x10, 0x40, 0xAB, 0x40]);

    let collector = AnnotationCollector::new();
    let annotations = collector.handle();

    let mut pipeline = Pipeline::new();
    pipeline.add_process("line", ReplaySource::new(waveform(&frames)))?;
    pipeline.add_process("updi", UpdiDecoder::new().with_samplerate(SAMPLERATE))?;
    pipeline.add_process("out", collector)?;
    pipeline.connect("line", "out", "updi", "updi")?;
    pipeline.connect("updi", "annotations", "out", "annotations")?;
    pipeline.build()?.wait()?;

    let annotations = annotations.lock().map_err(|_| "collector poisoned")?;
    for ann in annotations.iter() {
        if matches!(ann.kind, AnnotationKind::Command | AnnotationKind::Warning) {
            println!("{}", ann);
        }
    }
    Ok(())
}
