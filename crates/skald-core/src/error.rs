//! Error types for configuration and waveform decoding.

use thiserror::Error;

/// A voice configuration that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no \"default\" voice model is registered")]
    MissingDefault,

    #[error("malformed voice model URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("invalid voice spec '{0}': expected KEY=URL or KEY:SPEAKER=URL")]
    InvalidVoiceSpec(String),
}

/// A waveform buffer that could not be turned into samples.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("WAV buffer too short: {0} bytes (need at least 44)")]
    TooShort(usize),

    #[error("WAV header declares zero channels")]
    NoChannels,

    #[error("WAV header declares a sample rate of zero")]
    ZeroSampleRate,

    #[error("WAV data chunk holds no complete samples")]
    NoSamples,

    #[error("data chunk not found in WAV buffer")]
    DataChunkNotFound,

    #[error("unsupported WAV bit depth: {0} (only 8-bit and 16-bit PCM)")]
    UnsupportedBitDepth(u16),
}
