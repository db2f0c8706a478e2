//! mosaic-ensemble: tile-based multi-pitch recognition.
//!
//! A frame image is covered by overlapping rectangular regions. Each region
//! owns an independently trained [`model::RegionModel`]; the
//! [`ensemble::Ensemble`] runs them under bounded parallelism and combines
//! their predictions by majority vote and, optionally, by a learned
//! [`voting::VotingMetaClassifier`].
//!
//! # Quick Start
//!
//! ```ignore
//! use mosaic_ensemble::config::EnsembleConfig;
//! use mosaic_ensemble::ensemble::Ensemble;
//! use mosaic_ensemble::region::grid;
//!
//! let config = EnsembleConfig::with_regions(grid(800, 600, 4, 16));
//! let mut ensemble = Ensemble::setup(config)?;
//!
//! for frame in frames {
//!     ensemble.train(&frame)?;
//! }
//!
//! let pitches = ensemble.infer(&frame)?;
//! ensemble.save("models/grid".as_ref())?;
//! ```

pub mod accuracy;
pub mod codebook;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod executor;
pub mod model;
pub mod persist;
pub mod presets;
pub mod primitives;
pub mod region;
pub mod sdr;
pub mod types;
pub mod voting;
