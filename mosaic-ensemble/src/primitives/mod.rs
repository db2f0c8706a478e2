//! Trainable primitives used inside each region and by the voting stage.
//!
//! The ensemble only depends on the three traits below. The bundled
//! implementations are small enough to keep a region trainable on a laptop
//! and serialize to compact binary blobs.

pub mod classifier;
pub mod encoder;
pub mod memory;

pub use classifier::{ClassifierConfig, SdrClassifier};
pub use encoder::{ColumnEncoder, EncoderConfig};
pub use memory::{MemoryConfig, TransitionMemory};

use crate::sdr::Sdr;

/// Maps a binary input to a sparse column code.
pub trait SpatialEncoder {
    /// Encode `input`. Learning adapts the encoder toward the input.
    fn encode(&mut self, input: &Sdr, learn: bool) -> Sdr;

    /// Width of produced codes.
    fn output_width(&self) -> usize;
}

/// Short-term temporal context across successive codes.
pub trait SequenceMemory {
    /// Advance one step, returning the code extended with the memory's prediction.
    fn step(&mut self, code: &Sdr, learn: bool) -> Sdr;

    /// Forget the previous step, e.g. between sources.
    fn reset(&mut self);
}

/// Multi-label classifier over sparse codes.
pub trait LabelClassifier {
    /// Move the prediction for `code` toward `labels`.
    fn learn(&mut self, code: &Sdr, labels: &[u32]);

    /// Confidence per label index. All zeros when `code` is empty.
    fn infer(&self, code: &Sdr) -> Vec<f32>;

    /// Label indices whose confidence exceeds `threshold`.
    fn labels_above(pdf: &[f32], threshold: f32) -> Vec<u32>
    where
        Self: Sized,
    {
        pdf.iter()
            .enumerate()
            .filter_map(|(i, &p)| (p > threshold).then_some(i as u32))
            .collect()
    }
}
