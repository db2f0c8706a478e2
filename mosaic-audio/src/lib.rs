//! mosaic-audio: the acoustic front end.
//!
//! Decodes WAV and MIDI sources, tracks labelled notes, and turns audio into
//! the scrolling log-frequency images consumed by `mosaic-ensemble`. Also
//! turns per-frame predictions back into a MIDI file.
//!
//! # Quick Start
//!
//! ```ignore
//! use mosaic_audio::frontend::{AcousticFrontEnd, AudioSource};
//! use mosaic_audio::spectrogram::SpectrogramFrontEnd;
//!
//! let mut frontend = SpectrogramFrontEnd::default();
//! frontend.load_source(AudioSource::Path("songs/scale.wav".into()))?;
//!
//! while let Some(frame) = frontend.next() {
//!     ensemble.train(&frame)?;
//! }
//! ```

pub mod error;
pub mod frontend;
pub mod labeler;
pub mod midi;
pub mod notes;
pub mod spectrogram;
pub mod wav;
