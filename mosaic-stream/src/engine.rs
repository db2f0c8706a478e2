//! What a streaming session runs on each frame.

use crate::error::Result;
use crate::protocol::AvPacket;
use crate::visual;
use mosaic_audio::frontend::{AcousticFrontEnd, AudioSource};
use mosaic_audio::labeler::NoteLabeler;
use mosaic_ensemble::ensemble::Ensemble;
use mosaic_ensemble::types::Frame;

/// Per-frame processing behind a [`crate::session::StreamingSession`].
pub trait SessionEngine: Send {
    /// Clear temporal context before a new source.
    fn reset(&mut self);

    /// Turn one frame into a packet.
    fn process(&mut self, frame: &Frame) -> Result<AvPacket>;
}

/// Session engine backed by a trained ensemble.
#[derive(Debug)]
pub struct EnsembleEngine {
    ensemble: Ensemble,
}

impl EnsembleEngine {
    pub fn new(ensemble: Ensemble) -> Self {
        Self { ensemble }
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn ensemble_mut(&mut self) -> &mut Ensemble {
        &mut self.ensemble
    }

    /// Swap in another ensemble, returning the previous one.
    pub fn replace(&mut self, ensemble: Ensemble) -> Ensemble {
        std::mem::replace(&mut self.ensemble, ensemble)
    }

    /// Run a whole source through the ensemble and return the stable notes
    /// as MIDI file bytes. `on_progress` receives the percentage consumed
    /// after every frame.
    pub fn transcribe<F>(
        &mut self,
        frontend: &mut F,
        source: AudioSource,
        mut on_progress: impl FnMut(f32),
    ) -> Result<Vec<u8>>
    where
        F: AcousticFrontEnd + ?Sized,
    {
        frontend.load_source(source)?;
        self.ensemble.reset_memories();

        let mut labeler = NoteLabeler::new();
        while let Some(frame) = frontend.next() {
            let inference = self.ensemble.infer_detailed(&frame)?;
            let predicted = inference.voting.unwrap_or(inference.majority);
            labeler.add(&predicted, (frame.timestamp * 1000.0).round() as u64);
            on_progress(frontend.progress());
        }

        tracing::info!(frames = labeler.frames(), "transcription finished");
        Ok(labeler.to_midi()?)
    }
}

impl SessionEngine for EnsembleEngine {
    fn reset(&mut self) {
        self.ensemble.reset_memories();
    }

    fn process(&mut self, frame: &Frame) -> Result<AvPacket> {
        let inference = self.ensemble.infer_detailed(frame)?;
        let predicted = inference.voting.unwrap_or(inference.majority);
        tracing::trace!(ts = frame.timestamp, notes = %predicted, "frame processed");

        let regions = &self.ensemble.config().regions;
        let overlay = visual::frame_overlay(&frame.image, regions, &predicted)?;
        let sai = visual::to_base64(&visual::rgb_png(&overlay)?);

        let activations: Vec<_> = self
            .ensemble
            .models()
            .iter()
            .map(|model| model.activation_image())
            .collect();
        let activations = visual::to_base64(&visual::gray_png(&visual::tile(&activations))?);

        let voting = match self.ensemble.voting() {
            Some(voting) => {
                let row_width = self.ensemble.codebook().resolution();
                let code = visual::code_image(voting.last_input(), row_width);
                Some(visual::to_base64(&visual::gray_png(&code)?))
            }
            None => None,
        };

        Ok(AvPacket {
            sai,
            activations,
            voting,
            ts: frame.timestamp,
            notes: predicted.iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_audio::notes::NoteEvent;
    use mosaic_audio::spectrogram::{SpectrogramConfig, SpectrogramFrontEnd};
    use mosaic_ensemble::config::EnsembleConfig;
    use mosaic_ensemble::region::grid;
    use mosaic_ensemble::types::Image;

    fn small_ensemble(use_voting: bool) -> Ensemble {
        let config = EnsembleConfig {
            frame_width: 16,
            frame_height: 32,
            regions: grid(16, 32, 2, 2),
            use_voting,
            max_in_flight: 2,
            ..EnsembleConfig::default()
        };
        Ensemble::setup(config).unwrap()
    }

    #[test]
    fn packet_carries_visuals_and_timestamp() {
        let mut engine = EnsembleEngine::new(small_ensemble(true));
        let frame = Frame::new(Image::from_elem((32, 16), 90), 0.25);

        let packet = engine.process(&frame).unwrap();
        assert_eq!(packet.ts, 0.25);
        assert!(!packet.sai.is_empty());
        assert!(!packet.activations.is_empty());
        assert!(packet.voting.is_some());
    }

    #[test]
    fn packet_has_no_voting_image_without_voting_stage() {
        let mut engine = EnsembleEngine::new(small_ensemble(false));
        let frame = Frame::new(Image::zeros((32, 16)), 0.0);
        assert!(engine.process(&frame).unwrap().voting.is_none());
    }

    #[test]
    fn transcribe_reports_progress_and_writes_midi() {
        let mut engine = EnsembleEngine::new(small_ensemble(false));
        let mut frontend = SpectrogramFrontEnd::new(SpectrogramConfig {
            sample_rate: 8000,
            hop: 400,
            fft_size: 1024,
            width: 16,
            height: 32,
            ..SpectrogramConfig::DEFAULT
        });
        let source = AudioSource::Samples {
            samples: vec![0.0; 8000],
            notes: Some(vec![NoteEvent::on(60, 0), NoteEvent::off(60, 500)]),
        };

        let mut progress = Vec::new();
        let midi = engine
            .transcribe(&mut frontend, source, |p| progress.push(p))
            .unwrap();

        assert_eq!(&midi[..4], b"MThd");
        assert_eq!(progress.len(), 20);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(100.0));
    }
}
