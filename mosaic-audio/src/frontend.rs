//! The acoustic front end interface and audio sources.

use crate::error::Result;
use crate::midi;
use crate::notes::{self, NoteEvent};
use crate::wav;
use mosaic_ensemble::types::Frame;
use std::path::PathBuf;

/// Turns an audio source into a sequence of frames.
pub trait AcousticFrontEnd {
    /// Rewind to the start of the loaded source.
    fn reset(&mut self);

    /// Replace the current source and rewind.
    fn load_source(&mut self, source: AudioSource) -> Result<()>;

    /// Next frame, or `None` once the source is exhausted.
    fn next(&mut self) -> Option<Frame>;

    /// Bytes of f32 audio consumed so far.
    fn position_bytes(&self) -> u64;

    /// Bytes of f32 audio in the loaded source.
    fn total_bytes(&self) -> u64;

    /// Whole decoded source at [`AcousticFrontEnd::sample_rate`].
    fn samples(&self) -> &[f32];

    fn sample_rate(&self) -> u32;

    fn is_finished(&self) -> bool {
        self.position_bytes() >= self.total_bytes()
    }

    /// Percentage of the source consumed, `0..=100`.
    fn progress(&self) -> f32 {
        match self.total_bytes() {
            0 => 100.0,
            total => (self.position_bytes() as f64 / total as f64 * 100.0) as f32,
        }
    }
}

/// Where a front end gets its audio from.
#[derive(Clone, Debug)]
pub enum AudioSource {
    /// WAV file with an optional sibling `.csv` label file, or a `.mid`/`.midi` file
    Path(PathBuf),
    /// In-memory WAV bytes, unlabelled
    Wav(Vec<u8>),
    /// In-memory MIDI bytes, rendered and labelled by their own notes
    Midi(Vec<u8>),
    /// Mono samples already at the front end's rate
    Samples {
        samples: Vec<f32>,
        notes: Option<Vec<NoteEvent>>,
    },
}

/// A decoded source: mono samples and, when known, its note events.
#[derive(Clone, Debug, Default)]
pub struct DecodedSource {
    pub samples: Vec<f32>,
    pub notes: Option<Vec<NoteEvent>>,
}

/// Whether `path` names a MIDI file.
pub fn is_midi_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
}

/// Whether `path` names a WAV file.
pub fn is_wav_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

impl AudioSource {
    /// Decode to mono samples at `sample_rate`, with labels where the source has them.
    ///
    /// A label list without any events is treated as no labels.
    pub fn decode(self, sample_rate: u32) -> Result<DecodedSource> {
        let decoded = match self {
            AudioSource::Path(path) if is_midi_path(&path) => {
                tracing::debug!(path = ?path.display(), "rendering MIDI source");
                midi_source(&std::fs::read(&path)?, sample_rate)?
            }
            AudioSource::Path(path) => {
                let samples = wav::read_audio_mono(&path, sample_rate)?;
                let labels = path.with_extension("csv");
                let notes = if labels.is_file() {
                    Some(notes::read_notes(&labels)?)
                } else {
                    tracing::debug!(path = ?path.display(), "no label file");
                    None
                };
                DecodedSource { samples, notes }
            }
            AudioSource::Wav(bytes) => DecodedSource {
                samples: wav::decode_audio_mono(&bytes, sample_rate)?,
                notes: None,
            },
            AudioSource::Midi(bytes) => midi_source(&bytes, sample_rate)?,
            AudioSource::Samples { samples, notes } => DecodedSource { samples, notes },
        };

        Ok(DecodedSource {
            notes: decoded.notes.filter(|n| !n.is_empty()),
            ..decoded
        })
    }
}

fn midi_source(bytes: &[u8], sample_rate: u32) -> Result<DecodedSource> {
    let events = midi::parse_midi(bytes)?;
    Ok(DecodedSource {
        samples: midi::render_notes(&events, sample_rate),
        notes: Some(events),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{NoteSpan, format_notes};

    #[test]
    fn wav_path_picks_up_sibling_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scale.wav");
        wav::write_wav(&path, &[0.1; 441], 44100).unwrap();

        let unlabelled = AudioSource::Path(path.clone()).decode(44100).unwrap();
        assert_eq!(unlabelled.samples.len(), 441);
        assert!(unlabelled.notes.is_none());

        let events = vec![NoteEvent::on(60, 0), NoteEvent::off(60, 5)];
        std::fs::write(dir.path().join("scale.csv"), format_notes(&events)).unwrap();
        let labelled = AudioSource::Path(path).decode(44100).unwrap();
        assert_eq!(labelled.notes, Some(events));
    }

    #[test]
    fn empty_labels_count_as_unlabelled() {
        let source = AudioSource::Samples {
            samples: vec![0.0; 10],
            notes: Some(Vec::new()),
        };
        assert!(source.decode(44100).unwrap().notes.is_none());
    }

    #[test]
    fn midi_bytes_render_with_labels() {
        let bytes = midi::write_midi(&[NoteSpan {
            pitch: 69,
            start_ms: 0,
            end_ms: 200,
        }])
        .unwrap();

        let decoded = AudioSource::Midi(bytes).decode(8000).unwrap();
        assert_eq!(decoded.samples.len(), 8000 / 2);
        assert_eq!(decoded.notes.map(|n| n.len()), Some(2));
    }

    #[test]
    fn recognises_extensions() {
        assert!(is_midi_path("a/b.MID".as_ref()));
        assert!(is_midi_path("song.midi".as_ref()));
        assert!(!is_midi_path("song.wav".as_ref()));
        assert!(is_wav_path("song.WAV".as_ref()));
        assert!(!is_wav_path("song".as_ref()));
    }
}
