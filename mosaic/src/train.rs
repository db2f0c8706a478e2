//! Train subcommand - fit region models, then the voting stage.

use crate::cli::{EnsembleArgs, SpectrogramArgs};
use crate::config::{EnsembleSpec, default_models_dir, format_secs};
use crate::sources::labelled_sources;
use eyre::{Context, Result};
use mosaic_audio::frontend::{AcousticFrontEnd, AudioSource};
use mosaic_audio::spectrogram::{SpectrogramConfig, SpectrogramFrontEnd};
use mosaic_ensemble::config::EnsembleConfig;
use mosaic_ensemble::ensemble::Ensemble;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Seconds of source time between sequence-memory resets while training
/// the voting stage.
const VOTING_RESET_SECS: f64 = 1.0;

/// CLI arguments for training.
#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(flatten)]
    pub ensemble: EnsembleArgs,

    /// Output model directory (default: <data dir>/mosaic/models/<name>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Region training directory, repeatable (replaces the configured ones)
    #[arg(long = "train-dir")]
    pub train_dirs: Vec<PathBuf>,

    /// Voting training directory, repeatable (replaces the configured ones)
    #[arg(long = "voting-dir")]
    pub voting_dirs: Vec<PathBuf>,

    /// Passes over the region training directories
    #[arg(short, long, default_value_t = 1)]
    pub epochs: usize,

    #[command(flatten)]
    pub spectrogram: SpectrogramArgs,
}

/// Resolved configuration for training.
#[derive(Debug)]
pub struct Config {
    pub name: String,
    pub ensemble: EnsembleConfig,
    pub output: PathBuf,
    pub epochs: usize,
    pub spectrogram: SpectrogramConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let EnsembleSpec { name, mut config } = args.ensemble.try_into()?;

        if !args.train_dirs.is_empty() {
            config.train_dirs = args.train_dirs;
        }
        if !args.voting_dirs.is_empty() {
            config.voting_dirs = args.voting_dirs;
        }

        let output = match args.output {
            Some(output) => output,
            None => default_models_dir()?.join(&name),
        };

        Ok(Self {
            spectrogram: args.spectrogram.resolve(config.frame_size())?,
            name,
            ensemble: config,
            output,
            epochs: args.epochs.max(1),
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        name = %config.name,
        output = ?config.output.display(),
        regions = config.ensemble.regions.len(),
        "training ensemble"
    );

    let s = Instant::now();

    let mut ensemble =
        Ensemble::setup(config.ensemble.clone()).wrap_err("invalid ensemble configuration")?;
    let mut frontend = SpectrogramFrontEnd::new(config.spectrogram.clone());

    if config.ensemble.train_dirs.is_empty() {
        tracing::warn!("no training directories configured");
    }

    for epoch in 1..=config.epochs {
        for dir in &config.ensemble.train_dirs {
            let files = labelled_sources(dir)?;
            tracing::info!(epoch, dir = ?dir.display(), files = files.len(), "training regions");

            for file in &files {
                let frames = train_regions(&mut ensemble, &mut frontend, file)?;
                save(&ensemble, &config.output)?;
                tracing::debug!(path = ?file.display(), frames, "file trained");
            }

            let scores = crate::eval::evaluate(&mut ensemble, &mut frontend, &files)?;
            tracing::info!(dir = ?dir.display(), majority = %scores.majority, "directory evaluated");
        }
    }

    if ensemble.voting().is_some() {
        for dir in &config.ensemble.voting_dirs {
            let files = labelled_sources(dir)?;
            tracing::info!(dir = ?dir.display(), files = files.len(), "training voting stage");

            for file in &files {
                let frames = train_voting(&mut ensemble, &mut frontend, file)?;
                save(&ensemble, &config.output)?;
                tracing::debug!(path = ?file.display(), frames, "file trained");
            }

            let scores = crate::eval::evaluate(&mut ensemble, &mut frontend, &files)?;
            if let Some(voting) = scores.voting {
                tracing::info!(dir = ?dir.display(), %voting, "voting evaluated");
            }
        }
    }

    save(&ensemble, &config.output)?;

    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "training finished");

    Ok(())
}

fn save(ensemble: &Ensemble, output: &Path) -> Result<()> {
    ensemble
        .save(output)
        .wrap_err_with(|| format!("failed to save model: {:?}", output.display()))
}

fn load(frontend: &mut SpectrogramFrontEnd, file: &Path) -> Result<()> {
    frontend
        .load_source(AudioSource::Path(file.to_path_buf()))
        .wrap_err_with(|| format!("failed to load audio: {:?}", file.display()))
}

/// Train every region on every frame of `file`. Returns the frame count.
fn train_regions(
    ensemble: &mut Ensemble,
    frontend: &mut SpectrogramFrontEnd,
    file: &Path,
) -> Result<usize> {
    load(frontend, file)?;
    ensemble.reset_memories();

    let mut frames = 0;
    while let Some(frame) = frontend.next() {
        ensemble.train(&frame)?;
        frames += 1;
    }
    Ok(frames)
}

/// Train the voting stage on `file`, clearing sequence memories once per
/// second of source time. Returns the number of frames trained on.
fn train_voting(
    ensemble: &mut Ensemble,
    frontend: &mut SpectrogramFrontEnd,
    file: &Path,
) -> Result<usize> {
    load(frontend, file)?;
    ensemble.reset_memories();

    let mut next_reset = VOTING_RESET_SECS;
    let mut frames = 0;
    while let Some(frame) = frontend.next() {
        if frame.timestamp >= next_reset {
            ensemble.reset_memories();
            next_reset += VOTING_RESET_SECS;
        }
        if ensemble.train_voting(&frame)? {
            frames += 1;
        }
    }
    Ok(frames)
}
