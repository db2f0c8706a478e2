//! Test and transcribe subcommands - run a saved ensemble over audio.

use crate::cli::SpectrogramArgs;
use crate::config::format_secs;
use crate::sources::labelled_sources_in;
use eyre::{Context, Result};
use mosaic_audio::frontend::{AcousticFrontEnd, AudioSource};
use mosaic_audio::spectrogram::SpectrogramFrontEnd;
use mosaic_ensemble::accuracy::AccuracyStats;
use mosaic_ensemble::ensemble::Ensemble;
use mosaic_stream::engine::EnsembleEngine;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Accuracy of both aggregation stages.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scores {
    pub majority: AccuracyStats,
    /// `None` when the ensemble has no voting stage
    pub voting: Option<AccuracyStats>,
}

/// Run `files` through the ensemble and score every labelled frame.
pub fn evaluate<F>(ensemble: &mut Ensemble, frontend: &mut F, files: &[PathBuf]) -> Result<Scores>
where
    F: AcousticFrontEnd + ?Sized,
{
    let mut scores = Scores {
        majority: AccuracyStats::default(),
        voting: ensemble.voting().map(|_| AccuracyStats::default()),
    };

    for file in files {
        frontend
            .load_source(AudioSource::Path(file.clone()))
            .wrap_err_with(|| format!("failed to load audio: {:?}", file.display()))?;
        ensemble.reset_memories();

        while let Some(frame) = frontend.next() {
            let inference = ensemble.infer_detailed(&frame)?;
            let Some(truth) = &frame.truth else {
                continue;
            };

            scores.majority.record(truth, &inference.majority);
            if let (Some(stats), Some(voted)) = (scores.voting.as_mut(), inference.voting.as_ref()) {
                stats.record(truth, voted);
            }
        }
    }

    Ok(scores)
}

fn load_model(path: &Path) -> Result<Ensemble> {
    tracing::info!(path = ?path.display(), "loading model");
    let ensemble =
        Ensemble::load(path).wrap_err_with(|| format!("failed to load model: {:?}", path.display()))?;
    if !ensemble.is_fully_restored() {
        tracing::warn!("some weights were missing and start untrained");
    }
    Ok(ensemble)
}

/// CLI arguments for testing.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Saved model directory
    pub model: PathBuf,

    /// Directories of labelled audio
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,

    /// Print scores as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub spectrogram: SpectrogramArgs,
}

/// Resolved configuration for testing.
#[derive(Debug)]
pub struct Config {
    pub model: PathBuf,
    pub files: Vec<PathBuf>,
    pub json: bool,
    pub spectrogram: SpectrogramArgs,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            files: labelled_sources_in(&args.dirs)?,
            model: args.model,
            json: args.json,
            spectrogram: args.spectrogram,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let mut ensemble = load_model(&config.model)?;
    let spectrogram = config.spectrogram.resolve(ensemble.config().frame_size())?;
    let mut frontend = SpectrogramFrontEnd::new(spectrogram);

    tracing::info!(files = config.files.len(), "evaluating");
    let s = Instant::now();
    let scores = evaluate(&mut ensemble, &mut frontend, &config.files)?;
    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "evaluation completed");

    if config.json {
        let report = json!({
            "majority": scores.majority,
            "voting": scores.voting,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("majority: {}", scores.majority);
        if let Some(voting) = scores.voting {
            println!("voting:   {voting}");
        }
    }

    Ok(())
}

/// CLI arguments for WAV to MIDI transcription.
#[derive(clap::Args, Debug)]
pub struct TranscribeArgs {
    /// Saved model directory
    pub model: PathBuf,

    /// Path to input WAV file
    pub path: PathBuf,

    /// Output MIDI path (default: same as input with .mid extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub spectrogram: SpectrogramArgs,
}

/// Resolved configuration for transcription.
#[derive(Debug)]
pub struct TranscribeConfig {
    pub model: PathBuf,
    pub path: PathBuf,
    pub output: PathBuf,
    pub spectrogram: SpectrogramArgs,
}

impl TryFrom<TranscribeArgs> for TranscribeConfig {
    type Error = eyre::Error;

    fn try_from(args: TranscribeArgs) -> Result<Self> {
        let output = args
            .output
            .unwrap_or_else(|| args.path.with_extension("mid"));

        Ok(Self {
            model: args.model,
            path: args.path,
            output,
            spectrogram: args.spectrogram,
        })
    }
}

pub fn transcribe(config: TranscribeConfig) -> Result<()> {
    tracing::info!(
        input = ?config.path.display(),
        output = ?config.output.display(),
        "transcribing"
    );

    let ensemble = load_model(&config.model)?;
    let spectrogram = config.spectrogram.resolve(ensemble.config().frame_size())?;
    let mut frontend = SpectrogramFrontEnd::new(spectrogram);
    let mut engine = EnsembleEngine::new(ensemble);

    let s = Instant::now();
    let mut reported = 0;
    let midi = engine
        .transcribe(
            &mut frontend,
            AudioSource::Path(config.path.clone()),
            |progress| {
                let decile = (progress / 10.0) as u32;
                if decile > reported {
                    reported = decile;
                    tracing::debug!(progress, "transcribing");
                }
            },
        )
        .wrap_err("transcription failed")?;
    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "transcription completed");

    tracing::info!(path = ?config.output.display(), "write midi file");
    std::fs::write(&config.output, midi)
        .wrap_err_with(|| format!("failed to write midi: {:?}", config.output.display()))?;

    Ok(())
}
