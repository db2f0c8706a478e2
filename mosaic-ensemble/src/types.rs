//! Core types for mosaic-ensemble

use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Pitch identifier reserved for "no note".
pub const SILENCE: u8 = 0;

/// Highest valid pitch identifier (MIDI note number).
pub const MAX_PITCH: u8 = 127;

/// Grayscale frame image, indexed `[row, column]`. Row 0 is the top of the image.
pub type Image = Array2<u8>;

/// Ordered set of distinct pitch identifiers.
///
/// Identifiers above [`MAX_PITCH`] are rejected on insertion, so every set
/// stays inside `0..=127`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchSet(BTreeSet<u8>);

impl PitchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pitch, returning `false` when it is out of range or already present.
    pub fn insert(&mut self, pitch: u8) -> bool {
        pitch <= MAX_PITCH && self.0.insert(pitch)
    }

    pub fn remove(&mut self, pitch: u8) -> bool {
        self.0.remove(&pitch)
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.0.contains(&pitch)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn is_subset(&self, other: &PitchSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Copy of this set with the silence sentinel removed.
    pub fn without_silence(&self) -> PitchSet {
        self.iter().filter(|&p| p != SILENCE).collect()
    }

    /// Labels for a classifier: the pitches, or `[SILENCE]` when empty.
    pub fn labels(&self) -> Vec<u32> {
        if self.is_empty() {
            vec![u32::from(SILENCE)]
        } else {
            self.iter().map(u32::from).collect()
        }
    }
}

impl FromIterator<u8> for PitchSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = PitchSet::new();
        for pitch in iter {
            set.insert(pitch);
        }
        set
    }
}

impl<'a> IntoIterator for &'a PitchSet {
    type Item = &'a u8;
    type IntoIter = std::collections::btree_set::Iter<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for PitchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, pitch) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pitch}")?;
        }
        f.write_str("}")
    }
}

/// Axis-aligned rectangle over the frame image, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn area(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    pub const fn right(&self) -> usize {
        self.x.saturating_add(self.width)
    }

    pub const fn bottom(&self) -> usize {
        self.y.saturating_add(self.height)
    }

    /// Whether the region is non-empty and lies fully inside a `width`x`height` frame.
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|right| right <= width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= height)
    }

    /// Vertical centre in pixel rows.
    pub fn center_row(&self) -> f32 {
        self.y as f32 + (self.height as f32 - 1.0) / 2.0
    }

    /// View of the image covered by this region. Caller guarantees the region fits.
    pub fn crop<'a>(&self, image: &'a Image) -> ArrayView2<'a, u8> {
        image.slice(s![self.y..self.bottom(), self.x..self.right()])
    }
}

/// One time step produced by the acoustic front end.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Spectro-temporal image
    pub image: Image,
    /// Raw mono audio covered by this step
    pub audio: Vec<f32>,
    /// Time of the step in seconds
    pub timestamp: f64,
    /// Ground truth, `None` when the source carries no labels at all
    pub truth: Option<PitchSet>,
}

impl Frame {
    pub fn new(image: Image, timestamp: f64) -> Self {
        Self {
            image,
            audio: Vec::new(),
            timestamp,
            truth: None,
        }
    }

    pub fn with_truth(mut self, truth: PitchSet) -> Self {
        self.truth = Some(truth);
        self
    }

    pub fn with_audio(mut self, audio: Vec<f32>) -> Self {
        self.audio = audio;
        self
    }

    /// Image size as `(width, height)`.
    pub fn size(&self) -> (usize, usize) {
        let (rows, cols) = self.image.dim();
        (cols, rows)
    }
}
