//! Error types for mosaic-ensemble organized by stage.

use crate::types::Region;
use std::path::PathBuf;
use thiserror::Error;

/// Ensemble error variants organized by stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Frame validation error
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Save/load error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Worker pool could not be built
    #[error(transparent)]
    Executor(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration errors. Fatal at setup or load; no partial ensemble is produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Ensemble needs at least one region
    #[error("region list is empty")]
    EmptyRegions,

    /// Region does not fit inside the frame
    #[error("region {index} {region:?} exceeds frame bounds {width}x{height}")]
    RegionOutOfBounds {
        index: usize,
        region: Region,
        width: usize,
        height: usize,
    },

    /// A parameter holds a value outside its domain
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    /// Parameter file absent
    #[error("parameter file not found: {0}")]
    MissingParams(PathBuf),

    /// Parameter file present but unreadable
    #[error("invalid parameter file {path}: {source}")]
    InvalidParams {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Parameter file written by an incompatible version
    #[error("unsupported config version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Stored region models do not match the stored region list
    #[error("expected {expected} region models, found {found}")]
    RegionCountMismatch { expected: usize, found: usize },

    /// Unknown preset name
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

/// Frame errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame image smaller than the configured frame size
    #[error("frame is {got_width}x{got_height}, expected at least {width}x{height}")]
    SizeMismatch {
        width: usize,
        height: usize,
        got_width: usize,
        got_height: usize,
    },

    /// Voting input does not carry one prediction per region
    #[error("expected {expected} region predictions, got {got}")]
    PredictionCount { expected: usize, got: usize },
}

/// Persistence errors (files, JSON, binary weight blobs).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Binary weight blob error
    #[error(transparent)]
    Blob(#[from] bincode::Error),

    /// Malformed line in a note map file
    #[error("malformed note map line {line}: {content:?}")]
    NoteMap { line: usize, content: String },
}

/// Result type alias for mosaic-ensemble operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// std::io::Error → PersistenceError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(PersistenceError::Io(e))
    }
}

// serde_json::Error → PersistenceError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persistence(PersistenceError::Json(e))
    }
}

// bincode::Error → PersistenceError → Error
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Persistence(PersistenceError::Blob(e))
    }
}
