//! Column encoder: competitive sparse coding with Hebbian learning.

use super::SpatialEncoder;
use crate::sdr::Sdr;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Number of output columns
    pub columns: usize,
    /// Fraction of the input each column may connect to
    pub potential_pct: f32,
    /// Upper bound on potential synapses per column
    pub max_potential: usize,
    /// Fraction of columns active per step
    pub sparsity: f32,
    /// Permanence at which a synapse counts as connected
    pub connected: f32,
    pub permanence_inc: f32,
    pub permanence_dec: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            columns: 2048,
            potential_pct: 0.1,
            max_potential: 256,
            sparsity: 0.02,
            connected: 0.1,
            permanence_inc: 0.05,
            permanence_dec: 0.008,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnEncoder {
    config: EncoderConfig,
    input_width: usize,
    /// Input indices per column
    potential: Vec<Vec<u32>>,
    /// Permanence per potential synapse, parallel to `potential`
    permanence: Vec<Vec<f32>>,
}

impl ColumnEncoder {
    pub fn new(input_width: usize, config: EncoderConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pool = ((input_width as f32 * config.potential_pct).round() as usize)
            .max(1)
            .min(config.max_potential.max(1))
            .min(input_width);

        let potential: Vec<Vec<u32>> = (0..config.columns)
            .map(|_| {
                let mut pool: Vec<u32> = rand::seq::index::sample(&mut rng, input_width, pool)
                    .into_iter()
                    .map(|i| i as u32)
                    .collect();
                pool.sort_unstable();
                pool
            })
            .collect();

        // Start around the connection threshold so roughly half the pool is connected.
        let permanence = potential
            .iter()
            .map(|pool| {
                pool.iter()
                    .map(|_| config.connected * rng.random_range(0.5..1.5f32))
                    .collect()
            })
            .collect();

        Self {
            config,
            input_width,
            potential,
            permanence,
        }
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn active_count(&self) -> usize {
        ((self.config.columns as f32 * self.config.sparsity).round() as usize)
            .clamp(1, self.config.columns.max(1))
    }
}

impl SpatialEncoder for ColumnEncoder {
    fn encode(&mut self, input: &Sdr, learn: bool) -> Sdr {
        let bits = input.to_dense();
        let connected = self.config.connected;

        let mut overlaps: Vec<(usize, usize)> = self
            .potential
            .iter()
            .zip(&self.permanence)
            .enumerate()
            .map(|(column, (pool, perms))| {
                let overlap = pool
                    .iter()
                    .zip(perms)
                    .filter(|&(&i, &p)| p >= connected && bits.get(i as usize) == Some(&true))
                    .count();
                (column, overlap)
            })
            .filter(|&(_, overlap)| overlap > 0)
            .collect();

        overlaps.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        overlaps.truncate(self.active_count());

        if learn {
            let (inc, dec) = (self.config.permanence_inc, self.config.permanence_dec);
            for &(column, _) in &overlaps {
                let pool = &self.potential[column];
                for (perm, &i) in self.permanence[column].iter_mut().zip(pool) {
                    *perm = if bits.get(i as usize) == Some(&true) {
                        (*perm + inc).min(1.0)
                    } else {
                        (*perm - dec).max(0.0)
                    };
                }
            }
        }

        Sdr::from_sparse(self.config.columns, overlaps.iter().map(|&(c, _)| c as u32))
    }

    fn output_width(&self) -> usize {
        self.config.columns
    }
}
