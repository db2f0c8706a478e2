//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;
use mosaic_audio::wav::SAMPLE_RATE;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mosaic")]
#[command(about = "Multi-pitch recognition with region ensembles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Train an ensemble on labelled audio and save it
    Train(crate::train::Args),

    /// Report majority-vote and voting accuracy of a saved ensemble
    Test(crate::eval::Args),

    /// Transcribe a WAV file to MIDI with a saved ensemble
    Transcribe(crate::eval::TranscribeArgs),

    /// Serve saved ensembles over HTTP and WebSocket
    Serve(crate::serve::Args),

    /// Print a region layout with each region's pitch range
    Regions(crate::regions::Args),
}

/// Where the ensemble configuration comes from.
#[derive(clap::Args, Debug, Clone)]
pub struct EnsembleArgs {
    /// Named configuration (fenrir, brainiac, deep_eye, deep_eye2, many_eyes)
    #[arg(short, long, conflicts_with = "config")]
    pub preset: Option<String>,

    /// JSON configuration file, shaped like a saved main_params.json
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Spectrogram front end settings. Image size always follows the ensemble.
#[derive(clap::Args, Debug, Clone)]
pub struct SpectrogramArgs {
    /// Analysis sample rate in Hz
    #[arg(long, default_value_t = SAMPLE_RATE, value_parser = clap::value_parser!(u32).range(1..))]
    pub sample_rate: u32,

    /// Samples consumed per frame
    #[arg(long, default_value_t = 1024)]
    pub hop: usize,

    /// FFT window length
    #[arg(long, default_value_t = 4096)]
    pub fft_size: usize,

    /// Input audio is divided by this before analysis
    #[arg(long, default_value_t = 1.0)]
    pub loudness: f32,
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Train(args) => crate::train::execute(args.try_into()?),
        Commands::Test(args) => crate::eval::execute(args.try_into()?),
        Commands::Transcribe(args) => crate::eval::transcribe(args.try_into()?),
        Commands::Serve(args) => crate::serve::execute(args.try_into()?),
        Commands::Regions(args) => crate::regions::execute(args.try_into()?),
    }
}
