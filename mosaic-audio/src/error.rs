//! Error types for mosaic-audio organized by processing stage.

use thiserror::Error;

/// Front-end error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Audio decoding stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Note label parsing error
    #[error(transparent)]
    Labels(#[from] LabelError),

    /// MIDI parsing or writing error
    #[error(transparent)]
    Midi(#[from] MidiError),
}

/// Audio loading and validation errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Channel count validation failed
    #[error("invalid channel count: expected mono or stereo, got {0} channels")]
    InvalidChannels(u16),

    /// Sample rate of zero or otherwise unusable
    #[error("invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Source decoded to no samples
    #[error("audio source is empty")]
    Empty,

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Note label file errors.
#[derive(Debug, Error)]
pub enum LabelError {
    /// Line not of the form `<note>,<ms>,UP|DOWN`
    #[error("invalid note label on line {line}: {content:?}")]
    InvalidLine { line: usize, content: String },

    /// Note name not recognised
    #[error("unknown note name: {0}")]
    UnknownNote(String),
}

/// MIDI file errors.
#[derive(Debug, Error)]
pub enum MidiError {
    /// Standard MIDI file could not be parsed
    #[error(transparent)]
    Parse(#[from] midly::Error),

    /// Serialising a MIDI file failed
    #[error("failed to write MIDI: {0}")]
    Write(String),
}

/// Result type alias for mosaic-audio operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// midly::Error → MidiError → Error
impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::Midi(MidiError::Parse(e))
    }
}
