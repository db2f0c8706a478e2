//! Error types for mosaic-stream organized by stage.

use std::path::PathBuf;
use thiserror::Error;

/// Streaming service error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Ensemble setup, load or inference error
    #[error(transparent)]
    Ensemble(#[from] mosaic_ensemble::error::Error),

    /// Audio decoding or MIDI error
    #[error(transparent)]
    Audio(#[from] mosaic_audio::error::Error),

    /// Model catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Packet visual encoding error
    #[error(transparent)]
    Visual(#[from] VisualError),

    /// Wire message serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error (sockets, worker threads)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Model catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No selectable model with this name
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Models root holds no saved ensembles
    #[error("no models found under {0:?}")]
    Empty(PathBuf),
}

/// Image encoding errors.
#[derive(Debug, Error)]
pub enum VisualError {
    /// Pixel buffer does not match the stated dimensions
    #[error("pixel buffer does not match {width}x{height}")]
    BufferSize { width: usize, height: usize },

    /// PNG encoder error
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Result type alias for mosaic-stream operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// image::ImageError → VisualError → Error
impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Visual(VisualError::Image(e))
    }
}
