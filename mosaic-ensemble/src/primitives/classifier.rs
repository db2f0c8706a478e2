//! Softmax classifier over sparse codes.

use super::LabelClassifier;
use crate::sdr::Sdr;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Learning rate
    pub alpha: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { alpha: 0.001 }
    }
}

/// Single-layer softmax over a fixed label space.
///
/// Each active input bit contributes one weight row; the prediction is the
/// softmax of the summed rows. Learning pushes the distribution toward a
/// uniform split over the target labels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SdrClassifier {
    config: ClassifierConfig,
    /// `(input bits, labels)`
    weights: Array2<f32>,
}

impl SdrClassifier {
    pub fn new(input_width: usize, label_count: usize, config: ClassifierConfig) -> Self {
        Self {
            config,
            weights: Array2::zeros((input_width, label_count)),
        }
    }

    pub fn input_width(&self) -> usize {
        self.weights.nrows()
    }

    pub fn label_count(&self) -> usize {
        self.weights.ncols()
    }

    fn logits(&self, code: &Sdr) -> Vec<f32> {
        let mut logits = vec![0.0; self.label_count()];
        for &bit in code.active() {
            let bit = bit as usize;
            if bit >= self.weights.nrows() {
                continue;
            }
            for (l, w) in logits.iter_mut().zip(self.weights.row(bit)) {
                *l += w;
            }
        }
        logits
    }
}

impl LabelClassifier for SdrClassifier {
    fn learn(&mut self, code: &Sdr, labels: &[u32]) {
        let n = self.label_count();
        let labels: Vec<usize> = labels
            .iter()
            .map(|&l| l as usize)
            .filter(|&l| l < n)
            .collect();
        if code.is_empty() || labels.is_empty() {
            return;
        }

        let pdf = self.infer(code);
        let share = 1.0 / labels.len() as f32;
        let mut error: Vec<f32> = pdf.iter().map(|p| -p).collect();
        for &l in &labels {
            error[l] += share;
        }

        let alpha = self.config.alpha;
        let rows = self.weights.nrows();
        for &bit in code.active() {
            let bit = bit as usize;
            if bit >= rows {
                continue;
            }
            for (w, e) in self.weights.row_mut(bit).iter_mut().zip(&error) {
                *w += alpha * e;
            }
        }
    }

    fn infer(&self, code: &Sdr) -> Vec<f32> {
        let n = self.label_count();
        if code.is_empty() || n == 0 {
            return vec![0.0; n];
        }

        let logits = self.logits(code);
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.into_iter().map(|e| e / sum).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(alpha: f32) -> ClassifierConfig {
        ClassifierConfig { alpha }
    }

    #[test]
    fn untrained_is_uniform() {
        let clsr = SdrClassifier::new(8, 4, config(0.1));
        let pdf = clsr.infer(&Sdr::from_sparse(8, [1, 2]));
        assert!(pdf.iter().all(|&p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn empty_code_has_no_confidence() {
        let clsr = SdrClassifier::new(8, 4, config(0.1));
        assert_eq!(clsr.infer(&Sdr::new(8)), vec![0.0; 4]);
    }

    #[test]
    fn learns_multiple_labels() {
        let mut clsr = SdrClassifier::new(32, 10, config(0.2));
        let a = Sdr::from_sparse(32, [0, 5, 9]);
        let b = Sdr::from_sparse(32, [20, 25, 30]);

        for _ in 0..50 {
            clsr.learn(&a, &[3, 7]);
            clsr.learn(&b, &[1]);
        }

        assert_eq!(SdrClassifier::labels_above(&clsr.infer(&a), 0.3), vec![3, 7]);
        assert_eq!(SdrClassifier::labels_above(&clsr.infer(&b), 0.3), vec![1]);
    }

    #[test]
    fn ignores_labels_past_capacity() {
        let mut clsr = SdrClassifier::new(4, 2, config(0.5));
        let code = Sdr::from_sparse(4, [1]);
        clsr.learn(&code, &[9]);
        assert_eq!(clsr.infer(&code), vec![0.5, 0.5]);
    }
}
