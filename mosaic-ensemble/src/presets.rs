//! Named ensemble configurations.

use crate::config::{EnsembleConfig, RegionModelConfig, VotingConfig};
use crate::error::{ConfigError, Result};
use crate::primitives::{EncoderConfig, MemoryConfig};
use crate::region::{basic_regions, foveated, more_regions};
use crate::types::Region;
use std::path::PathBuf;

/// Names accepted by [`preset`].
pub const PRESET_NAMES: [&str; 5] = ["fenrir", "brainiac", "deep_eye", "deep_eye2", "many_eyes"];

const FULL_FRAME: Region = Region::new(0, 0, 800, 600);

/// Configuration registered under `name`.
pub fn preset(name: &str) -> Result<EnsembleConfig> {
    match name {
        "fenrir" => Ok(fenrir()),
        "brainiac" => Ok(brainiac()),
        "deep_eye" => Ok(deep_eye()),
        "deep_eye2" => Ok(deep_eye2()),
        "many_eyes" => Ok(many_eyes()),
        _ => Err(ConfigError::UnknownPreset(name.to_string()).into()),
    }
}

fn dirs(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from("train").join(n)).collect()
}

/// Region model over a `size`x`size` resized input; the column count grows with `depth`.
fn model(size: usize, depth: usize) -> RegionModelConfig {
    RegionModelConfig {
        input_size: Some((size, size)),
        encoder: EncoderConfig {
            columns: size * depth * 8,
            ..EncoderConfig::default()
        },
        ..RegionModelConfig::default()
    }
}

/// Single full-frame region with sequence memory.
pub fn fenrir() -> EnsembleConfig {
    EnsembleConfig {
        regions: vec![FULL_FRAME],
        model: RegionModelConfig {
            memory: Some(MemoryConfig::default()),
            ..model(32, 8)
        },
        train_dirs: dirs(&["rnd_train", "rnd_train"]),
        ..EnsembleConfig::default()
    }
}

/// Hand-placed regions, each conditioned on its frequency position.
pub fn brainiac() -> EnsembleConfig {
    EnsembleConfig {
        regions: basic_regions(),
        model: RegionModelConfig {
            memory: Some(MemoryConfig {
                max_transitions: 30,
                ..MemoryConfig::default()
            }),
            location_conditioning: true,
            ..model(32, 4)
        },
        train_dirs: dirs(&["midi_train", "rnd_train", "rnd_multi"]),
        ..EnsembleConfig::default()
    }
}

/// Single full-frame region at a larger input size, no memory.
pub fn deep_eye() -> EnsembleConfig {
    EnsembleConfig {
        regions: vec![FULL_FRAME],
        model: model(48, 16),
        train_dirs: dirs(&["rnd_train", "rnd_train"]),
        ..EnsembleConfig::default()
    }
}

/// [`deep_eye`] with more columns and a wider training set.
pub fn deep_eye2() -> EnsembleConfig {
    EnsembleConfig {
        regions: vec![FULL_FRAME],
        model: model(48, 22),
        train_dirs: dirs(&["rnd_train", "rnd_multi", "midi_train"]),
        ..EnsembleConfig::default()
    }
}

/// Eighteen regions combined by a three-region vote and a learned voting stage.
pub fn many_eyes() -> EnsembleConfig {
    let mut regions = basic_regions();
    regions.extend(more_regions());
    regions.extend(foveated(800, 600, 8, 200, 10));

    EnsembleConfig {
        regions,
        model: model(32, 16),
        train_dirs: dirs(&["rnd_train", "rnd_multi", "midi_train"]),
        voting_dirs: dirs(&["rnd_train", "rnd_multi", "midi_train"]),
        use_voting: true,
        voting: VotingConfig {
            memory: Some(MemoryConfig {
                min_count: 8,
                ..MemoryConfig::default()
            }),
            ..VotingConfig::default()
        },
        vote_repeats: 2,
        pred_thresh: 0.099,
        ..EnsembleConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        for name in PRESET_NAMES {
            let config = preset(name).unwrap();
            assert!(config.validate().is_ok(), "{name} failed validation");
        }
    }

    #[test]
    fn many_eyes_votes() {
        let config = many_eyes();
        assert_eq!(config.regions.len(), 18);
        assert!(config.use_voting);
        assert_eq!(config.vote_repeats, 2);
    }

    #[test]
    fn unknown_preset_is_config_error() {
        assert!(matches!(
            preset("nope"),
            Err(crate::error::Error::Config(ConfigError::UnknownPreset(_)))
        ));
    }
}
