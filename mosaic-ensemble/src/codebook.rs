//! Deterministic pitch → sparse code mapping.
//!
//! Every pitch identifier `0..=127` owns a fixed-width [`NoteCode`] with about
//! 2% of its bits set. Codes are derived from a seed keyed by the pitch, so two
//! codebooks built with the same resolution and seed are bit-identical. A
//! codebook can also be written to and read from a `note_map.txt` table.

use crate::error::{PersistenceError, Result};
use crate::sdr::Sdr;
use crate::types::{MAX_PITCH, PitchSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt::Write as _;
use std::path::Path;

/// Sparse code for a pitch or a set of pitches.
pub type NoteCode = Sdr;

/// Default code width in bits.
pub const DEFAULT_RESOLUTION: usize = 256;

/// Fraction of bits set in a single-pitch code.
pub const CODE_SPARSITY: f32 = 0.02;

const PITCH_COUNT: usize = MAX_PITCH as usize + 1;

#[derive(Clone, Debug, PartialEq)]
pub struct NoteCodeBook {
    resolution: usize,
    codes: Vec<NoteCode>,
}

impl NoteCodeBook {
    /// Generate a codebook of `resolution` bits per code from `seed`.
    pub fn new(resolution: usize, seed: u64) -> Self {
        let bits = ((resolution as f32 * CODE_SPARSITY).round() as usize).clamp(1, resolution);

        let codes = (0..PITCH_COUNT as u64)
            .map(|pitch| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed ^ pitch.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let indices = rand::seq::index::sample(&mut rng, resolution, bits);
                Sdr::from_sparse(resolution, indices.into_iter().map(|i| i as u32))
            })
            .collect();

        Self { resolution, codes }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Code for one pitch. Identifiers above 127 map to the code of 127.
    pub fn encode(&self, pitch: u8) -> &NoteCode {
        &self.codes[usize::from(pitch.min(MAX_PITCH))]
    }

    /// Union of the members' codes. An empty set yields an all-zero code.
    pub fn encode_set(&self, pitches: &PitchSet) -> NoteCode {
        pitches
            .iter()
            .fold(Sdr::new(self.resolution), |acc, pitch| {
                acc.union(self.encode(pitch))
            })
    }

    /// Active bit indices of a dense code.
    pub fn decode(dense: &[bool]) -> Vec<u32> {
        Sdr::from_dense(dense).active().to_vec()
    }

    /// Render as `note_map.txt`: one `<pitch>:<bitstring>` line per pitch.
    pub fn to_note_map(&self) -> String {
        let mut out = String::with_capacity(PITCH_COUNT * (self.resolution + 5));
        for (pitch, code) in self.codes.iter().enumerate() {
            let _ = write!(out, "{pitch}:");
            out.extend(code.to_dense().iter().map(|&b| if b { '1' } else { '0' }));
            out.push('\n');
        }
        out
    }

    /// Parse a `note_map.txt` table. All lines must share one width.
    pub fn from_note_map(text: &str) -> Result<Self> {
        let mut resolution = None;
        let mut codes = vec![None; PITCH_COUNT];

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let malformed = || PersistenceError::NoteMap {
                line: line_no + 1,
                content: line.chars().take(32).collect(),
            };

            let (pitch, bits) = line.split_once(':').ok_or_else(malformed)?;
            let pitch: usize = pitch.trim().parse().map_err(|_| malformed())?;
            if pitch >= PITCH_COUNT || *resolution.get_or_insert(bits.len()) != bits.len() {
                return Err(malformed().into());
            }

            let dense = bits
                .chars()
                .map(|c| match c {
                    '1' => Ok(true),
                    '0' => Ok(false),
                    _ => Err(malformed()),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            codes[pitch] = Some(Sdr::from_dense(&dense));
        }

        let resolution = resolution.unwrap_or(0);
        let codes = codes
            .into_iter()
            .enumerate()
            .map(|(pitch, code)| {
                code.ok_or(PersistenceError::NoteMap {
                    line: 0,
                    content: format!("missing pitch {pitch}"),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { resolution, codes })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_note_map())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_note_map(&std::fs::read_to_string(path)?)
    }
}
