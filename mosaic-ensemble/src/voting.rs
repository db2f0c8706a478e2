//! Learned second-stage vote over per-region predictions.
//!
//! Each region's prediction is encoded with the shared codebook and the codes
//! are concatenated in region order, so the classifier sees which region
//! proposed which pitch rather than a pooled count.

use crate::codebook::NoteCodeBook;
use crate::config::{CONFIG_VERSION, VotingConfig};
use crate::error::{ConfigError, FrameError, Result};
use crate::persist::{self, CLASSIFIER_BLOB, MEMORY_BLOB, PARAMS};
use crate::primitives::{LabelClassifier, SdrClassifier, SequenceMemory, TransitionMemory};
use crate::sdr::Sdr;
use crate::types::{MAX_PITCH, PitchSet, SILENCE};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of `voting/params.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingParams {
    pub version: u32,
    pub region_count: usize,
    pub code_width: usize,
    pub config: VotingConfig,
}

#[derive(Debug)]
pub struct VotingMetaClassifier {
    config: VotingConfig,
    region_count: usize,
    codebook: NoteCodeBook,
    memory: Option<TransitionMemory>,
    classifier: SdrClassifier,
    rng: ChaCha8Rng,
    last_input: Sdr,
    restored: bool,
}

impl VotingMetaClassifier {
    /// Voting stage over `region_count` regions, `codebook.resolution()` bits each.
    pub fn new(region_count: usize, codebook: NoteCodeBook, config: VotingConfig) -> Self {
        let width = region_count * codebook.resolution();
        let memory = config
            .memory
            .clone()
            .map(|m| TransitionMemory::new(width, m));
        let classifier = SdrClassifier::new(
            width,
            usize::from(MAX_PITCH) + 1,
            config.classifier.clone(),
        );

        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            region_count,
            codebook,
            memory,
            classifier,
            last_input: Sdr::new(width),
            restored: false,
        }
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Concatenated code of the most recent step.
    pub fn last_input(&self) -> &Sdr {
        &self.last_input
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Concatenate one code per region. Empty predictions encode the silence code.
    pub fn encode(&self, predictions: &[PitchSet]) -> Result<Sdr> {
        if predictions.len() != self.region_count {
            return Err(FrameError::PredictionCount {
                expected: self.region_count,
                got: predictions.len(),
            }
            .into());
        }

        let codes: Vec<Sdr> = predictions
            .iter()
            .map(|prediction| {
                let pitches = prediction.without_silence();
                if pitches.is_empty() {
                    self.codebook.encode(SILENCE).clone()
                } else {
                    self.codebook.encode_set(&pitches)
                }
            })
            .collect();

        Ok(Sdr::concat(&codes))
    }

    fn step(&mut self, mut code: Sdr, learn: bool) -> Sdr {
        if learn {
            code.add_noise(self.config.noise, &mut self.rng);
        }
        self.last_input = code.clone();
        match &mut self.memory {
            Some(memory) => memory.step(&code, learn),
            None => code,
        }
    }

    /// Learn the mapping from per-region predictions to `truth`.
    pub fn train(&mut self, truth: &PitchSet, predictions: &[PitchSet]) -> Result<()> {
        let code = self.encode(predictions)?;
        let code = self.step(code, true);
        self.classifier.learn(&code, &truth.labels());
        Ok(())
    }

    /// Voted pitches above the configured threshold. Silence is stripped.
    pub fn infer(&mut self, predictions: &[PitchSet]) -> Result<PitchSet> {
        let code = self.encode(predictions)?;
        let code = self.step(code, false);
        let pdf = self.classifier.infer(&code);

        Ok(SdrClassifier::labels_above(&pdf, self.config.pred_thresh)
            .into_iter()
            .filter(|&l| l != u32::from(SILENCE))
            .filter_map(|l| u8::try_from(l).ok())
            .collect())
    }

    pub fn reset_memory(&mut self) {
        if let Some(memory) = &mut self.memory {
            memory.reset();
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let params = VotingParams {
            version: CONFIG_VERSION,
            region_count: self.region_count,
            code_width: self.codebook.resolution(),
            config: self.config.clone(),
        };
        persist::write_json(&dir.join(PARAMS), &params)?;
        if let Some(memory) = &self.memory {
            persist::write_blob(&dir.join(MEMORY_BLOB), memory)?;
        }
        persist::write_blob(&dir.join(CLASSIFIER_BLOB), &self.classifier)?;
        Ok(())
    }

    /// Construct from `dir/params.json`, checking it matches the ensemble, then restore weights.
    pub fn load(dir: &Path, codebook: NoteCodeBook, region_count: usize) -> Result<Self> {
        let params: VotingParams = persist::read_params(&dir.join(PARAMS))?;
        if params.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: params.version,
                expected: CONFIG_VERSION,
            }
            .into());
        }
        if params.region_count != region_count {
            return Err(ConfigError::RegionCountMismatch {
                expected: region_count,
                found: params.region_count,
            }
            .into());
        }
        if params.code_width != codebook.resolution() {
            return Err(ConfigError::InvalidParam {
                name: "voting.code_width",
                reason: format!(
                    "stored {} but codebook has {}",
                    params.code_width,
                    codebook.resolution()
                ),
            }
            .into());
        }

        let mut voting = Self::new(region_count, codebook, params.config);
        voting.load_weights(dir)?;
        Ok(voting)
    }

    /// Restore weight blobs. Returns `false` when any expected file is missing.
    pub fn load_weights(&mut self, dir: &Path) -> Result<bool> {
        let mut complete = true;

        if self.memory.is_some() {
            match persist::read_blob::<TransitionMemory>(&dir.join(MEMORY_BLOB))? {
                Some(memory) if memory.width() == self.classifier.input_width() => {
                    self.memory = Some(memory)
                }
                _ => complete = false,
            }
        }

        match persist::read_blob::<SdrClassifier>(&dir.join(CLASSIFIER_BLOB))? {
            Some(classifier) if classifier.input_width() == self.classifier.input_width() => {
                self.classifier = classifier
            }
            _ => complete = false,
        }

        self.restored = complete;
        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ClassifierConfig;

    fn voting(regions: usize) -> VotingMetaClassifier {
        let config = VotingConfig {
            noise: 0.0,
            memory: None,
            classifier: ClassifierConfig { alpha: 0.2 },
            ..VotingConfig::default()
        };
        VotingMetaClassifier::new(regions, NoteCodeBook::new(128, 5), config)
    }

    fn set(pitches: &[u8]) -> PitchSet {
        pitches.iter().copied().collect()
    }

    #[test]
    fn encoding_preserves_region_position() {
        let voting = voting(3);
        let a = vec![set(&[60]), set(&[64]), set(&[])];
        let b = vec![set(&[64]), set(&[60]), set(&[])];
        assert_ne!(voting.encode(&a).unwrap(), voting.encode(&b).unwrap());

        let same = vec![set(&[60]), set(&[60]), set(&[])];
        let swapped = vec![same[1].clone(), same[0].clone(), same[2].clone()];
        assert_eq!(voting.encode(&same).unwrap(), voting.encode(&swapped).unwrap());
    }

    #[test]
    fn empty_prediction_encodes_silence() {
        let voting = voting(2);
        let code = voting.encode(&[set(&[]), set(&[])]).unwrap();
        let silence = NoteCodeBook::new(128, 5).encode(SILENCE).count();
        assert_eq!(code.count(), 2 * silence);
        assert_eq!(code.width(), 256);
    }

    #[test]
    fn rejects_wrong_region_count() {
        let voting = voting(2);
        assert!(matches!(
            voting.encode(&[set(&[60])]),
            Err(crate::error::Error::Frame(FrameError::PredictionCount { expected: 2, got: 1 }))
        ));
    }

    #[test]
    fn learns_which_region_to_trust() {
        let mut voting = voting(2);
        // Region 0 is right, region 1 always claims 72.
        for _ in 0..40 {
            voting.train(&set(&[60]), &[set(&[60]), set(&[72])]).unwrap();
            voting.train(&set(&[]), &[set(&[]), set(&[72])]).unwrap();
        }

        assert_eq!(voting.infer(&[set(&[60]), set(&[72])]).unwrap(), set(&[60]));
        assert!(voting.infer(&[set(&[]), set(&[72])]).unwrap().is_empty());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut original = voting(2);
        original.train(&set(&[60]), &[set(&[60]), set(&[60])]).unwrap();
        original.save(dir.path()).unwrap();

        let mut loaded = VotingMetaClassifier::load(dir.path(), NoteCodeBook::new(128, 5), 2).unwrap();
        assert!(loaded.is_restored());
        let input = [set(&[60]), set(&[60])];
        assert_eq!(loaded.infer(&input).unwrap(), original.infer(&input).unwrap());

        assert!(matches!(
            VotingMetaClassifier::load(dir.path(), NoteCodeBook::new(128, 5), 3),
            Err(crate::error::Error::Config(ConfigError::RegionCountMismatch { .. }))
        ));
    }
}
