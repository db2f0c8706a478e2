//! Serve subcommand - HTTP and WebSocket streaming of saved ensembles.

use crate::cli::SpectrogramArgs;
use crate::config::default_models_dir;
use eyre::{Context, Result};
use mosaic_stream::catalog::ModelCatalog;
use mosaic_stream::server::{self, AppState};
use mosaic_stream::session::{DEFAULT_BUFFERING_PACKETS, SessionConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI arguments for the server.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Directory of saved ensembles (default: <data dir>/mosaic/models)
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Ensemble to start with (default: first by name)
    #[arg(long)]
    pub model: Option<String>,

    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// Packets sent before waiting for the client to continue
    #[arg(long, default_value_t = DEFAULT_BUFFERING_PACKETS)]
    pub buffering_packets: usize,

    #[command(flatten)]
    pub spectrogram: SpectrogramArgs,
}

/// Resolved configuration for the server.
#[derive(Debug)]
pub struct Config {
    pub models: PathBuf,
    pub model: Option<String>,
    pub addr: SocketAddr,
    pub session: SessionConfig,
    pub spectrogram: SpectrogramArgs,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let models = match args.models {
            Some(models) => models,
            None => default_models_dir()?,
        };

        Ok(Self {
            models,
            model: args.model,
            addr: args.addr,
            session: SessionConfig {
                buffering_packets: args.buffering_packets,
                ..SessionConfig::default()
            },
            spectrogram: args.spectrogram,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let mut catalog = ModelCatalog::new(&config.models);

    let (name, ensemble) = match &config.model {
        Some(name) => {
            let ensemble = catalog.load(name)?;
            catalog.select(name)?;
            (name.clone(), ensemble)
        }
        None => catalog
            .load_default()
            .wrap_err_with(|| format!("no usable model under {:?}", config.models.display()))?,
    };
    tracing::info!(%name, regions = ensemble.region_count(), "model ready");

    let spectrogram = config.spectrogram.resolve(ensemble.config().frame_size())?;
    let state = AppState::new(catalog, ensemble, spectrogram, config.session);

    let runtime = tokio::runtime::Runtime::new().wrap_err("failed to start runtime")?;
    runtime
        .block_on(server::serve(config.addr, state))
        .wrap_err("server failed")
}
