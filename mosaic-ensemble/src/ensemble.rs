//! Ensemble orchestration: bounded-parallel fan-out across region models,
//! majority-vote aggregation and the optional learned voting stage.

use crate::codebook::NoteCodeBook;
use crate::config::EnsembleConfig;
use crate::error::{ConfigError, FrameError, Result};
use crate::executor::BoundedExecutor;
use crate::model::RegionModel;
use crate::persist::{self, MAIN_PARAMS, NOTE_MAP, VOTING_DIR};
use crate::region::FrequencyAxis;
use crate::types::{Frame, PitchSet, SILENCE};
use crate::voting::VotingMetaClassifier;
use std::collections::BTreeMap;
use std::path::Path;

/// Keep pitches proposed by strictly more than `vote_repeats` regions.
pub fn aggregate(predictions: &[PitchSet], vote_repeats: usize) -> PitchSet {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for prediction in predictions {
        for pitch in prediction.iter().filter(|&p| p != SILENCE) {
            *counts.entry(pitch).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter_map(|(pitch, count)| (count > vote_repeats).then_some(pitch))
        .collect()
}

/// Everything computed for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inference {
    /// Prediction of each region, in region order
    pub regions: Vec<PitchSet>,
    /// Majority-vote result
    pub majority: PitchSet,
    /// Voting-stage result, when the stage is enabled
    pub voting: Option<PitchSet>,
}

/// Region models plus their aggregation stages.
///
/// The ensemble exclusively owns its region models; within a step each
/// model is handed to exactly one worker.
#[derive(Debug)]
pub struct Ensemble {
    config: EnsembleConfig,
    models: Vec<RegionModel>,
    voting: Option<VotingMetaClassifier>,
    codebook: NoteCodeBook,
    executor: BoundedExecutor,
}

impl Ensemble {
    /// Build a fresh ensemble with one region model per configured region.
    pub fn setup(config: EnsembleConfig) -> Result<Self> {
        config.validate()?;

        let axis = FrequencyAxis::hearing(config.frame_height);
        let codebook = NoteCodeBook::new(config.note_code_width, config.note_code_seed);
        let executor = BoundedExecutor::new(config.max_in_flight)?;

        let models = executor.map(&config.regions, |index, region| {
            RegionModel::new(index, *region, &config.model, &axis, &codebook)
        });

        let voting = config.use_voting.then(|| {
            VotingMetaClassifier::new(models.len(), codebook.clone(), config.voting.clone())
        });

        tracing::info!(
            regions = models.len(),
            voting = config.use_voting,
            max_in_flight = executor.max_in_flight(),
            "ensemble ready"
        );

        Ok(Self {
            config,
            models,
            voting,
            codebook,
            executor,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn models(&self) -> &[RegionModel] {
        &self.models
    }

    pub fn voting(&self) -> Option<&VotingMetaClassifier> {
        self.voting.as_ref()
    }

    pub fn codebook(&self) -> &NoteCodeBook {
        &self.codebook
    }

    pub fn region_count(&self) -> usize {
        self.models.len()
    }

    /// Whether every region model and the voting stage found all their weights on load.
    pub fn is_fully_restored(&self) -> bool {
        self.models.iter().all(RegionModel::is_restored)
            && self.voting.as_ref().is_none_or(VotingMetaClassifier::is_restored)
    }

    fn check_frame(&self, frame: &Frame) -> Result<()> {
        let (width, height) = frame.size();
        if width < self.config.frame_width || height < self.config.frame_height {
            return Err(FrameError::SizeMismatch {
                width: self.config.frame_width,
                height: self.config.frame_height,
                got_width: width,
                got_height: height,
            }
            .into());
        }
        Ok(())
    }

    /// Train every region model on `frame`.
    ///
    /// Frames without ground truth still train the encoders; only the
    /// classifiers are skipped.
    pub fn train(&mut self, frame: &Frame) -> Result<()> {
        self.check_frame(frame)?;
        let truth = frame.truth.as_ref();
        self.executor
            .for_each_mut(&mut self.models, |_, model| model.train(&frame.image, truth));
        Ok(())
    }

    /// Per-region predictions for `frame`, in region order.
    pub fn infer_regions(&mut self, frame: &Frame) -> Result<Vec<PitchSet>> {
        self.check_frame(frame)?;
        let pred_thresh = self.config.pred_thresh;
        Ok(self
            .executor
            .map_mut(&mut self.models, |_, model| model.infer(&frame.image, pred_thresh)))
    }

    /// Majority-vote prediction for `frame`.
    pub fn infer(&mut self, frame: &Frame) -> Result<PitchSet> {
        let predictions = self.infer_regions(frame)?;
        Ok(aggregate(&predictions, self.config.vote_repeats))
    }

    /// Region predictions, majority vote and voting-stage result from one pass.
    pub fn infer_detailed(&mut self, frame: &Frame) -> Result<Inference> {
        let regions = self.infer_regions(frame)?;
        let majority = aggregate(&regions, self.config.vote_repeats);
        let voting = match &mut self.voting {
            Some(voting) => Some(voting.infer(&regions)?),
            None => None,
        };

        Ok(Inference {
            regions,
            majority,
            voting,
        })
    }

    /// Train the voting stage on `frame`. Returns `false` when there is no
    /// voting stage or the frame carries no ground truth.
    pub fn train_voting(&mut self, frame: &Frame) -> Result<bool> {
        if self.voting.is_none() {
            return Ok(false);
        }
        let Some(truth) = frame.truth.as_ref() else {
            return Ok(false);
        };

        let predictions = self.infer_regions(frame)?;
        if let Some(voting) = &mut self.voting {
            voting.train(truth, &predictions)?;
        }
        Ok(true)
    }

    /// Voting-stage prediction for `frame`, `None` without a voting stage.
    pub fn infer_voting(&mut self, frame: &Frame) -> Result<Option<PitchSet>> {
        if self.voting.is_none() {
            return Ok(None);
        }

        let predictions = self.infer_regions(frame)?;
        match &mut self.voting {
            Some(voting) => Ok(Some(voting.infer(&predictions)?)),
            None => Ok(None),
        }
    }

    /// Clear the sequence-memory context of every region and the voting stage.
    pub fn reset_memories(&mut self) {
        self.executor
            .for_each_mut(&mut self.models, |_, model| model.reset_memory());
        if let Some(voting) = &mut self.voting {
            voting.reset_memory();
        }
    }

    fn shares_codebook(&self) -> bool {
        self.config.model.location_conditioning || self.config.use_voting
    }

    /// Write the full model directory tree under `root`.
    pub fn save(&self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root)?;
        persist::write_json(&root.join(MAIN_PARAMS), &self.config)?;

        if self.shares_codebook() {
            self.codebook.save(root.join(NOTE_MAP))?;
        }

        let results = self.executor.map(&self.models, |index, model| {
            model.save(&persist::model_dir(root, index))
        });
        results.into_iter().collect::<Result<Vec<_>>>()?;

        for (index, dir) in persist::model_dirs(root)? {
            if index >= self.models.len() {
                tracing::debug!(path = ?dir.display(), "removing stale region model");
                std::fs::remove_dir_all(&dir)?;
            }
        }

        if let Some(voting) = &self.voting {
            voting.save(&root.join(VOTING_DIR))?;
        }

        tracing::info!(path = ?root.display(), regions = self.models.len(), "ensemble saved");
        Ok(())
    }

    /// Construct an ensemble from a directory written by [`Ensemble::save`].
    ///
    /// Missing or invalid parameter files fail the load. Missing weight
    /// files are logged and leave the affected parts freshly initialized;
    /// check [`Ensemble::is_fully_restored`].
    pub fn load(root: &Path) -> Result<Self> {
        let config: EnsembleConfig = persist::read_params(&root.join(MAIN_PARAMS))?;
        config.validate()?;

        let axis = FrequencyAxis::hearing(config.frame_height);
        let note_map = root.join(NOTE_MAP);
        let codebook = if note_map.is_file() {
            NoteCodeBook::load(&note_map)?
        } else {
            if config.model.location_conditioning || config.use_voting {
                tracing::warn!(path = ?note_map.display(), "note map missing, regenerating from seed");
            }
            NoteCodeBook::new(config.note_code_width, config.note_code_seed)
        };

        let dirs = persist::model_dirs(root)?;
        if dirs.len() != config.regions.len() {
            return Err(ConfigError::RegionCountMismatch {
                expected: config.regions.len(),
                found: dirs.len(),
            }
            .into());
        }

        let executor = BoundedExecutor::new(config.max_in_flight)?;
        let jobs: Vec<_> = dirs
            .iter()
            .map(|(_, dir)| dir)
            .zip(config.regions.iter().copied())
            .collect();
        let models = executor
            .map(&jobs, |_, (dir, region)| {
                RegionModel::load_region(dir, *region, &axis, &codebook)
            })
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let voting = if config.use_voting {
            Some(VotingMetaClassifier::load(
                &root.join(VOTING_DIR),
                codebook.clone(),
                models.len(),
            )?)
        } else {
            None
        };

        let ensemble = Self {
            config,
            models,
            voting,
            codebook,
            executor,
        };

        tracing::info!(
            path = ?root.display(),
            regions = ensemble.models.len(),
            restored = ensemble.is_fully_restored(),
            "ensemble loaded"
        );

        Ok(ensemble)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Region;

    fn set(pitches: &[u8]) -> PitchSet {
        pitches.iter().copied().collect()
    }

    #[test]
    fn setup_rejects_empty_regions() {
        let result = Ensemble::setup(EnsembleConfig::default());
        assert!(matches!(result, Err(Error::Config(ConfigError::EmptyRegions))));
    }

    #[test]
    fn aggregate_requires_strict_majority() {
        let predictions = vec![set(&[60, 64]), set(&[60]), set(&[67, 0])];
        assert_eq!(aggregate(&predictions, 0), set(&[60, 64, 67]));
        assert_eq!(aggregate(&predictions, 1), set(&[60]));
        assert!(aggregate(&predictions, 2).is_empty());
    }

    #[test]
    fn raising_threshold_never_adds_pitches() {
        let predictions = vec![
            set(&[40, 41, 42]),
            set(&[41, 42]),
            set(&[42, 90]),
            set(&[]),
            set(&[42, 41, 90]),
        ];
        for low in 0..6 {
            for high in low + 1..7 {
                assert!(aggregate(&predictions, high).is_subset(&aggregate(&predictions, low)));
            }
        }
    }

    #[test]
    fn rejects_undersized_frame() {
        let config = EnsembleConfig {
            frame_width: 20,
            frame_height: 20,
            ..EnsembleConfig::with_regions(vec![Region::new(0, 0, 10, 10)])
        };
        let mut ensemble = Ensemble::setup(config).unwrap();
        let frame = Frame::new(crate::types::Image::zeros((10, 10)), 0.0);
        assert!(matches!(
            ensemble.infer(&frame),
            Err(Error::Frame(FrameError::SizeMismatch { .. }))
        ));
    }
}
