//! Precision/recall bookkeeping over predicted and ground-truth pitch sets.

use crate::types::PitchSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl AccuracyStats {
    /// Count one frame. The silence sentinel is ignored on both sides.
    pub fn record(&mut self, truth: &PitchSet, predicted: &PitchSet) {
        let truth = truth.without_silence();
        let predicted = predicted.without_silence();

        for pitch in predicted.iter() {
            if truth.contains(pitch) {
                self.true_positives += 1;
            } else {
                self.false_positives += 1;
            }
        }

        self.false_negatives += truth.iter().filter(|&p| !predicted.contains(p)).count() as u64;
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl AddAssign for AccuracyStats {
    fn add_assign(&mut self, other: Self) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

impl fmt::Display for AccuracyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "precision {:.3} recall {:.3} f1 {:.3} (tp {}, fp {}, fn {})",
            self.precision(),
            self.recall(),
            self.f1(),
            self.true_positives,
            self.false_positives,
            self.false_negatives
        )
    }
}
