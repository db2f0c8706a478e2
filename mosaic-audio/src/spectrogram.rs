//! Scrolling log-frequency spectrogram front end.
//!
//! Every hop of audio is Hann-windowed, transformed with an FFT and
//! resampled onto a logarithmic frequency axis. The new column enters at
//! the right edge of a fixed-size image and older columns scroll left, so
//! the image always shows the most recent `width` hops.

use crate::error::Result;
use crate::frontend::{AcousticFrontEnd, AudioSource};
use crate::notes::ActiveNotes;
use crate::wav::SAMPLE_RATE;
use mosaic_ensemble::region::{FrequencyAxis, MAX_HZ, MIN_HZ};
use mosaic_ensemble::types::{Frame, Image};
use ndarray::s;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub sample_rate: u32,
    /// Samples consumed per frame
    pub hop: usize,
    /// FFT window length
    pub fft_size: usize,
    /// Image width in columns (hops of history)
    pub width: usize,
    /// Image height in rows
    pub height: usize,
    pub min_hz: f32,
    pub max_hz: f32,
    /// Level shown as black, in dB below full scale
    pub floor_db: f32,
    /// Analysis input is divided by this before the transform
    pub loudness_coef: f32,
}

impl SpectrogramConfig {
    pub const DEFAULT: Self = Self {
        sample_rate: SAMPLE_RATE,
        hop: 1024,
        fft_size: 4096,
        width: 800,
        height: 600,
        min_hz: MIN_HZ,
        max_hz: MAX_HZ,
        floor_db: -80.0,
        loudness_coef: 1.0,
    };

    pub fn axis(&self) -> FrequencyAxis {
        FrequencyAxis {
            min_hz: self.min_hz,
            max_hz: self.max_hz,
            rows: self.height,
        }
    }

    /// Duration of one hop in seconds.
    pub fn hop_secs(&self) -> f64 {
        self.hop as f64 / f64::from(self.sample_rate.max(1))
    }
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Create Hann window for STFT.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (window_length as f32 - 1.0)).cos())
        .collect()
}

pub struct SpectrogramFrontEnd {
    config: SpectrogramConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Fractional FFT bin shown at each image row
    row_bins: Vec<f32>,
    /// Magnitude of a full-scale sine after windowing
    reference: f32,
    samples: Vec<f32>,
    labels: Option<ActiveNotes>,
    position: usize,
    image: Image,
}

impl std::fmt::Debug for SpectrogramFrontEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramFrontEnd")
            .field("config", &self.config)
            .field("samples", &self.samples.len())
            .field("labelled", &self.labels.is_some())
            .field("position", &self.position)
            .finish()
    }
}

impl SpectrogramFrontEnd {
    pub fn new(mut config: SpectrogramConfig) -> Self {
        config.hop = config.hop.max(1);
        config.fft_size = config.fft_size.max(config.hop).max(2);
        config.width = config.width.max(1);
        config.height = config.height.max(1);

        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.fft_size);
        let window = hann_window(config.fft_size);
        let reference = window.iter().sum::<f32>() / 2.0;

        let axis = config.axis();
        let bin_hz = config.sample_rate as f32 / config.fft_size as f32;
        let row_bins = (0..config.height)
            .map(|row| axis.row_to_hz(row as f32) / bin_hz)
            .collect();

        let image = Image::zeros((config.height, config.width));

        Self {
            config,
            fft,
            window,
            row_bins,
            reference,
            samples: Vec::new(),
            labels: None,
            position: 0,
            image,
        }
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    /// Whether the loaded source carries note labels.
    pub fn is_labelled(&self) -> bool {
        self.labels.is_some()
    }

    /// Spectrogram column for the window ending at sample `end`, as pixel levels.
    fn column(&self, end: usize) -> Vec<u8> {
        let n = self.config.fft_size;
        let mut buffer: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let sample = (end + i)
                    .checked_sub(n)
                    .and_then(|idx| self.samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                Complex::new(sample / self.config.loudness_coef * self.window[i], 0.0)
            })
            .collect();

        self.fft.process(&mut buffer);

        let last_bin = n / 2;
        let magnitude = |bin: usize| buffer[bin.min(last_bin)].norm() / self.reference;
        let floor = self.config.floor_db.min(-1.0);

        self.row_bins
            .iter()
            .map(|&bin| {
                let left = bin.floor() as usize;
                let frac = bin - bin.floor();
                let mag = magnitude(left) * (1.0 - frac) + magnitude(left + 1) * frac;
                let db = 20.0 * mag.max(1e-10).log10();
                (((db - floor) / -floor).clamp(0.0, 1.0) * 255.0) as u8
            })
            .collect()
    }

    fn scroll_in(&mut self, column: &[u8]) {
        let width = self.config.width;
        if width > 1 {
            let shifted = self.image.slice(s![.., 1..]).to_owned();
            self.image.slice_mut(s![.., ..width - 1]).assign(&shifted);
        }
        for (pixel, &value) in self.image.column_mut(width - 1).iter_mut().zip(column) {
            *pixel = value;
        }
    }
}

impl Default for SpectrogramFrontEnd {
    fn default() -> Self {
        Self::new(SpectrogramConfig::DEFAULT)
    }
}

impl AcousticFrontEnd for SpectrogramFrontEnd {
    fn reset(&mut self) {
        self.position = 0;
        self.image.fill(0);
        if let Some(labels) = &mut self.labels {
            labels.reset();
        }
    }

    fn load_source(&mut self, source: AudioSource) -> Result<()> {
        let decoded = source.decode(self.config.sample_rate)?;
        tracing::debug!(
            samples = decoded.samples.len(),
            labelled = decoded.notes.is_some(),
            "source loaded"
        );

        self.samples = decoded.samples;
        self.labels = decoded.notes.map(ActiveNotes::new);
        self.reset();
        Ok(())
    }

    fn next(&mut self) -> Option<Frame> {
        if self.position >= self.samples.len() {
            return None;
        }

        let start = self.position;
        let end = (start + self.config.hop).min(self.samples.len());
        let column = self.column(end);
        self.scroll_in(&column);

        let timestamp = start as f64 / f64::from(self.config.sample_rate);
        let mut frame = Frame::new(self.image.clone(), timestamp)
            .with_audio(self.samples[start..end].to_vec());

        if let Some(labels) = &mut self.labels {
            frame = frame.with_truth(labels.current());
            labels.advance((end as u64 * 1000) / u64::from(self.config.sample_rate));
        }

        self.position = end;
        Some(frame)
    }

    fn position_bytes(&self) -> u64 {
        self.position as u64 * F32_BYTES
    }

    fn total_bytes(&self) -> u64 {
        self.samples.len() as u64 * F32_BYTES
    }

    fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
