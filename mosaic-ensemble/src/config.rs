//! Versioned configuration records for the ensemble and its members.
//!
//! Every record deserializes with documented defaults, so a partial
//! `main_params.json` still yields a complete configuration.

use crate::codebook::DEFAULT_RESOLUTION;
use crate::error::{ConfigError, Result};
use crate::executor::DEFAULT_MAX_IN_FLIGHT;
use crate::primitives::{ClassifierConfig, EncoderConfig, MemoryConfig};
use crate::types::Region;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version written into every parameter file.
pub const CONFIG_VERSION: u32 = 1;

/// Default frame width in pixels.
pub const DEFAULT_FRAME_WIDTH: usize = 800;

/// Default frame height in pixels.
pub const DEFAULT_FRAME_HEIGHT: usize = 600;

/// Ensemble-wide configuration, persisted as `main_params.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub version: u32,
    /// Frame image width
    pub frame_width: usize,
    /// Frame image height
    pub frame_height: usize,
    /// One region model per rectangle
    pub regions: Vec<Region>,
    /// Shared hyperparameters for every region model
    pub model: RegionModelConfig,
    /// Directories of labelled sources used for region training
    pub train_dirs: Vec<PathBuf>,
    /// Directories of labelled sources used for voting training
    pub voting_dirs: Vec<PathBuf>,
    /// Enable the learned voting stage
    pub use_voting: bool,
    pub voting: VotingConfig,
    /// A pitch survives majority vote when more than this many regions propose it
    pub vote_repeats: usize,
    /// Minimum classifier confidence for a label to count as predicted
    pub pred_thresh: f32,
    /// Region units of work in flight per step
    pub max_in_flight: usize,
    /// Width of the shared note codes
    pub note_code_width: usize,
    /// Seed of the shared note codebook
    pub note_code_seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            regions: Vec::new(),
            model: RegionModelConfig::default(),
            train_dirs: Vec::new(),
            voting_dirs: Vec::new(),
            use_voting: false,
            voting: VotingConfig::default(),
            vote_repeats: 0,
            pred_thresh: 0.1,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            note_code_width: DEFAULT_RESOLUTION,
            note_code_seed: 42,
        }
    }
}

impl EnsembleConfig {
    /// Configuration over `regions` with every other field at its default.
    pub fn with_regions(regions: Vec<Region>) -> Self {
        Self {
            regions,
            ..Self::default()
        }
    }

    /// Reject configurations that cannot produce a working ensemble.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                expected: CONFIG_VERSION,
            }
            .into());
        }

        if self.regions.is_empty() {
            return Err(ConfigError::EmptyRegions.into());
        }

        for (index, region) in self.regions.iter().enumerate() {
            if !region.fits(self.frame_width, self.frame_height) {
                return Err(ConfigError::RegionOutOfBounds {
                    index,
                    region: *region,
                    width: self.frame_width,
                    height: self.frame_height,
                }
                .into());
            }
        }

        check_threshold("pred_thresh", self.pred_thresh)?;
        check_threshold("voting.pred_thresh", self.voting.pred_thresh)?;
        check_fraction("model.train_noise", self.model.train_noise)?;
        check_fraction("voting.noise", self.voting.noise)?;

        if self.note_code_width == 0 {
            return Err(invalid("note_code_width", "must be positive"));
        }

        if self.model.encoder.columns == 0 {
            return Err(invalid("model.encoder.columns", "must be positive"));
        }

        if matches!(self.model.input_size, Some((0, _) | (_, 0))) {
            return Err(invalid("model.input_size", "must be positive"));
        }

        Ok(())
    }

    /// `(width, height)` of the frame.
    pub fn frame_size(&self) -> (usize, usize) {
        (self.frame_width, self.frame_height)
    }
}

/// Hyperparameters of one region model, persisted in `model_<i>/params.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionModelConfig {
    /// Resize the cropped region to `(width, height)` before encoding; native size when `None`
    pub input_size: Option<(usize, usize)>,
    /// Pixels at or above this value become active input bits
    pub binary_thresh: u8,
    /// Probability per active input bit of being relocated during training
    pub train_noise: f32,
    pub encoder: EncoderConfig,
    /// Sequence memory; disabled when `None`
    pub memory: Option<MemoryConfig>,
    pub classifier: ClassifierConfig,
    /// Restrict each region's labels to the pitch band it covers
    pub restrict_pitch_range: bool,
    /// Append the code of the region's centre pitch to its input
    pub location_conditioning: bool,
    /// Base seed; region `i` uses `seed + i`
    pub seed: u64,
}

impl Default for RegionModelConfig {
    fn default() -> Self {
        Self {
            input_size: None,
            binary_thresh: 40,
            train_noise: 0.1,
            encoder: EncoderConfig::default(),
            memory: None,
            classifier: ClassifierConfig::default(),
            restrict_pitch_range: false,
            location_conditioning: false,
            seed: 42,
        }
    }
}

/// Voting classifier configuration, persisted in `voting/params.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Probability per active bit of being relocated during training
    pub noise: f32,
    /// Sequence memory over the concatenated code; disabled when `None`
    pub memory: Option<MemoryConfig>,
    pub classifier: ClassifierConfig,
    /// Minimum confidence for a voted label
    pub pred_thresh: f32,
    pub seed: u64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            noise: 0.05,
            memory: None,
            classifier: ClassifierConfig::default(),
            pred_thresh: 0.1,
            seed: 7,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> crate::error::Error {
    ConfigError::InvalidParam {
        name,
        reason: reason.into(),
    }
    .into()
}

fn check_threshold(name: &'static str, value: f32) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, format!("{value} not in [0, 1)")))
    }
}

fn check_fraction(name: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, format!("{value} not in [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn voting_memory_is_opt_in() {
        assert_eq!(VotingConfig::default().memory, None);

        let parsed: VotingConfig = serde_json::from_str(r#"{"noise": 0.1}"#).unwrap();
        assert_eq!(parsed.memory, None);
        assert!(crate::presets::many_eyes().voting.memory.is_some());
    }

    #[test]
    fn rejects_empty_regions() {
        let result = EnsembleConfig::default().validate();
        assert!(matches!(result, Err(Error::Config(ConfigError::EmptyRegions))));
    }

    #[test]
    fn rejects_region_outside_frame() {
        let config = EnsembleConfig::with_regions(vec![Region::new(700, 0, 200, 100)]);
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::RegionOutOfBounds { index: 0, .. }))
        ));
    }

    #[test]
    fn rejects_bad_threshold() {
        let config = EnsembleConfig {
            pred_thresh: 1.5,
            ..EnsembleConfig::with_regions(vec![Region::new(0, 0, 10, 10)])
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::InvalidParam { name: "pred_thresh", .. }))
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"regions":[{"x":0,"y":0,"width":100,"height":50}],"vote_repeats":2}"#;
        let config: EnsembleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.vote_repeats, 2);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.model.binary_thresh, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_future_version() {
        let config = EnsembleConfig {
            version: CONFIG_VERSION + 1,
            ..EnsembleConfig::with_regions(vec![Region::new(0, 0, 10, 10)])
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::UnsupportedVersion { .. }))
        ));
    }
}
