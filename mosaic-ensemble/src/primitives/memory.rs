//! First-order transition memory over column codes.

use super::SequenceMemory;
use crate::sdr::Sdr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Observations needed before a transition can predict
    pub min_count: u32,
    /// Fraction of active bits that must agree on a predicted bit
    pub agreement: f32,
    /// Distinct successors tracked per bit
    pub max_transitions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_count: 2,
            agreement: 0.5,
            max_transitions: 64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionMemory {
    config: MemoryConfig,
    width: usize,
    /// Observed successors per bit with their counts
    transitions: HashMap<u32, HashMap<u32, u32>>,
    #[serde(skip)]
    previous: Option<Sdr>,
}

impl TransitionMemory {
    pub fn new(width: usize, config: MemoryConfig) -> Self {
        Self {
            config,
            width,
            transitions: HashMap::new(),
            previous: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Bits expected to follow `code`.
    pub fn predict(&self, code: &Sdr) -> Sdr {
        if code.is_empty() {
            return Sdr::new(self.width);
        }

        let mut votes: HashMap<u32, usize> = HashMap::new();
        for bit in code.active() {
            let Some(successors) = self.transitions.get(bit) else {
                continue;
            };
            for (&next, &count) in successors {
                if count >= self.config.min_count {
                    *votes.entry(next).or_default() += 1;
                }
            }
        }

        let needed = ((code.count() as f32 * self.config.agreement).ceil() as usize).max(1);
        Sdr::from_sparse(
            self.width,
            votes
                .into_iter()
                .filter_map(|(bit, n)| (n >= needed).then_some(bit)),
        )
    }

    fn observe(&mut self, from: &Sdr, to: &Sdr) {
        let cap = self.config.max_transitions;
        for &a in from.active() {
            let successors = self.transitions.entry(a).or_default();
            for &b in to.active() {
                if let Some(count) = successors.get_mut(&b) {
                    *count = count.saturating_add(1);
                } else if successors.len() < cap {
                    successors.insert(b, 1);
                }
            }
        }
    }
}

impl SequenceMemory for TransitionMemory {
    fn step(&mut self, code: &Sdr, learn: bool) -> Sdr {
        if learn && let Some(previous) = self.previous.take() {
            self.observe(&previous, code);
        }
        self.previous = Some(code.clone());
        code.union(&self.predict(code))
    }

    fn reset(&mut self) {
        self.previous = None;
    }
}
