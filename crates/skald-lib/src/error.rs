use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use skald_core::error::{ConfigError, DecodeError};

/// Failure while caching a voice model file.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} failed with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("cache write to {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while running the synthesis engine.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("model file missing: {0:?}")]
    ModelMissing(PathBuf),

    #[error("failed to launch synthesis engine {engine:?}: {source}")]
    Spawn {
        engine: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesis engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("synthesis engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("synthesis produced no output at {0:?}")]
    NoOutput(PathBuf),
}

/// Failure handing audio to the output device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("playback thread has shut down")]
    Closed,

    #[error("cannot play a clip with {channels} channels at {sample_rate} Hz")]
    InvalidFormat { channels: u16, sample_rate: u32 },
}

/// Any stage of a speech request failing.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("failed to read synthesized audio: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SpeechError {
    /// Pipeline stage the error came from, for log records.
    pub fn stage(&self) -> &'static str {
        match self {
            SpeechError::Config(_) => "resolve",
            SpeechError::Fetch(_) => "fetch",
            SpeechError::Synthesis(_) => "synthesize",
            SpeechError::Read(_) | SpeechError::Decode(_) => "decode",
            SpeechError::Playback(_) => "play",
        }
    }
}
