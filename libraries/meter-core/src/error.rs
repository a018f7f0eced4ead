//! Error types for meter setup
//!
//! Everything here happens at instantiation or on the observer side. The audio
//! path never returns these: it drops work or publishes a sentinel instead.

use thiserror::Error;

/// Result type for meter operations
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur while building or configuring a meter
#[derive(Error, Debug)]
pub enum MeterError {
    /// Sample rate outside the supported range
    #[error("Invalid sample rate: {0} Hz (must be between 8000 and 384000)")]
    InvalidSampleRate(u32),

    /// Host block size exceeds the fixed scratch allocation
    #[error("Block size {requested} exceeds the supported maximum of {max}")]
    BlockSizeTooLarge { requested: usize, max: usize },

    /// Invalid channel count for the selected meter
    #[error("Invalid channel count: {0} (must be 1 or 2)")]
    InvalidChannelCount(usize),

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Oversampling resampler could not be built
    #[error("Resampler initialization failed: {0}")]
    Resampler(String),

    /// Loudness filter bank could not be built
    #[error("Loudness analysis setup failed: {0}")]
    Loudness(String),

    /// Band filter design failed
    #[error("Filter design failed: {0}")]
    Filter(String),

    /// Event could not be encoded or decoded
    #[error("Event codec error: {0}")]
    Codec(String),

    /// The ring buffer consumer was already handed to an observer
    #[error("Observer endpoint already taken")]
    ObserverTaken,
}

impl From<serde_json::Error> for MeterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
