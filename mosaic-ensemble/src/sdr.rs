//! Fixed-width sparse binary vectors.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fixed-width sparse binary vector stored as sorted active bit indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sdr {
    width: usize,
    active: Vec<u32>,
}

impl Sdr {
    /// All-zero vector of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            active: Vec::new(),
        }
    }

    /// Build from active indices. Indices outside `0..width` are ignored.
    pub fn from_sparse(width: usize, indices: impl IntoIterator<Item = u32>) -> Self {
        let mut active: Vec<u32> = indices
            .into_iter()
            .filter(|&i| (i as usize) < width)
            .collect();
        active.sort_unstable();
        active.dedup();
        Self { width, active }
    }

    /// Build from a dense bit slice.
    pub fn from_dense(bits: &[bool]) -> Self {
        let active = bits
            .iter()
            .enumerate()
            .filter_map(|(i, &bit)| bit.then_some(i as u32))
            .collect();
        Self {
            width: bits.len(),
            active,
        }
    }

    pub fn to_dense(&self) -> Vec<bool> {
        let mut bits = vec![false; self.width];
        for &i in &self.active {
            bits[i as usize] = true;
        }
        bits
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn active(&self) -> &[u32] {
        &self.active
    }

    pub fn count(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.active.binary_search(&index).is_ok()
    }

    /// Bitwise union. The result takes the wider of the two widths.
    pub fn union(&self, other: &Sdr) -> Sdr {
        Sdr::from_sparse(
            self.width.max(other.width),
            self.active.iter().chain(&other.active).copied(),
        )
    }

    /// Number of bits active in both vectors.
    pub fn overlap(&self, other: &Sdr) -> usize {
        let (mut i, mut j, mut n) = (0, 0, 0);
        while i < self.active.len() && j < other.active.len() {
            match self.active[i].cmp(&other.active[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    n += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        n
    }

    /// Positional concatenation: part `i` occupies the bit slice following parts `0..i`.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Sdr>) -> Sdr {
        let mut width = 0;
        let mut active = Vec::new();
        for part in parts {
            active.extend(part.active.iter().map(|&i| i + width as u32));
            width += part.width;
        }
        Sdr { width, active }
    }

    /// Relocate each active bit with probability `fraction` to a random inactive position.
    ///
    /// Sparsity is preserved. A full vector is left untouched.
    pub fn add_noise<R: Rng + ?Sized>(&mut self, fraction: f32, rng: &mut R) {
        if fraction <= 0.0 || self.active.is_empty() || self.active.len() >= self.width {
            return;
        }

        let mut bits = self.to_dense();
        for &index in &self.active {
            if !rng.random_bool(f64::from(fraction.min(1.0))) {
                continue;
            }
            let target = loop {
                let candidate = rng.random_range(0..self.width);
                if !bits[candidate] {
                    break candidate;
                }
            };
            bits[index as usize] = false;
            bits[target] = true;
        }
        *self = Sdr::from_dense(&bits);
    }
}
