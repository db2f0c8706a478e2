//! Configuration types for resolved CLI arguments.
//!
//! Args structs shared by several subcommands live in cli.rs; this module
//! resolves them into library configuration records.

use crate::cli::{EnsembleArgs, SpectrogramArgs};
use eyre::{Context, OptionExt, Result, bail, ensure};
use mosaic_audio::spectrogram::SpectrogramConfig;
use mosaic_ensemble::config::EnsembleConfig;
use mosaic_ensemble::presets;
use std::path::PathBuf;

/// Resolved ensemble configuration and the name it goes by.
#[derive(Debug, Clone)]
pub struct EnsembleSpec {
    pub name: String,
    pub config: EnsembleConfig,
}

impl TryFrom<EnsembleArgs> for EnsembleSpec {
    type Error = eyre::Error;

    fn try_from(args: EnsembleArgs) -> Result<Self> {
        match (args.preset, args.config) {
            (Some(name), _) => {
                let config = presets::preset(&name)
                    .wrap_err_with(|| format!("available presets: {}", presets::PRESET_NAMES.join(", ")))?;
                Ok(Self { name, config })
            }
            (None, Some(path)) => {
                let text = std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("failed to read config: {:?}", path.display()))?;
                let config: EnsembleConfig = serde_json::from_str(&text)
                    .wrap_err_with(|| format!("invalid config: {:?}", path.display()))?;
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_eyre("config path has no file name")?
                    .to_owned();
                Ok(Self { name, config })
            }
            (None, None) => bail!("either --preset or --config is required"),
        }
    }
}

impl SpectrogramArgs {
    /// Front end settings producing `(width, height)` frames.
    pub fn resolve(&self, (width, height): (usize, usize)) -> Result<SpectrogramConfig> {
        ensure!(self.sample_rate > 0, "invalid sample rate: {}", self.sample_rate);
        ensure!(
            self.loudness.is_finite() && self.loudness > 0.0,
            "loudness must be positive: {}",
            self.loudness
        );

        Ok(SpectrogramConfig {
            sample_rate: self.sample_rate,
            hop: self.hop,
            fft_size: self.fft_size,
            width,
            height,
            loudness_coef: self.loudness,
            ..SpectrogramConfig::DEFAULT
        })
    }
}

/// `<data dir>/mosaic/models`.
pub fn default_models_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_eyre("failed to find data directory")?
        .join("mosaic")
        .join("models"))
}

/// Format seconds as a string with two decimal places.
pub fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_preset() {
        let spec = EnsembleSpec::try_from(EnsembleArgs {
            preset: Some("brainiac".into()),
            config: None,
        })
        .unwrap();
        assert_eq!(spec.name, "brainiac");
        assert!(!spec.config.regions.is_empty());
    }

    #[test]
    fn rejects_unknown_preset_and_missing_source() {
        let unknown = EnsembleArgs {
            preset: Some("cyclops".into()),
            config: None,
        };
        assert!(EnsembleSpec::try_from(unknown).is_err());

        let none = EnsembleArgs {
            preset: None,
            config: None,
        };
        assert!(EnsembleSpec::try_from(none).is_err());
    }

    #[test]
    fn resolves_partial_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.json");
        std::fs::write(&path, r#"{"frame_width": 16, "frame_height": 32, "vote_repeats": 2}"#).unwrap();

        let spec = EnsembleSpec::try_from(EnsembleArgs {
            preset: None,
            config: Some(path),
        })
        .unwrap();
        assert_eq!(spec.name, "tiny");
        assert_eq!(spec.config.frame_size(), (16, 32));
        assert_eq!(spec.config.vote_repeats, 2);
    }

    #[test]
    fn spectrogram_follows_frame_size() {
        let args = SpectrogramArgs {
            sample_rate: 16000,
            hop: 256,
            fft_size: 1024,
            loudness: 2.0,
        };
        let config = args.resolve((40, 60)).unwrap();
        assert_eq!((config.width, config.height), (40, 60));
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.loudness_coef, 2.0);
    }

    #[test]
    fn spectrogram_rejects_zero_sample_rate() {
        let args = SpectrogramArgs {
            sample_rate: 0,
            hop: 256,
            fft_size: 1024,
            loudness: 1.0,
        };
        assert!(args.resolve((40, 60)).is_err());

        let quiet = SpectrogramArgs {
            sample_rate: 16000,
            loudness: 0.0,
            ..args
        };
        assert!(quiet.resolve((40, 60)).is_err());
    }

    #[test]
    fn formats_secs() {
        assert_eq!(format_secs(1.234), "1.23s");
    }
}
