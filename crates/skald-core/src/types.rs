//! Shared types for the skald speech engine.
//!
//! These types are used across skald-lib, skald-cli, and embedders. Keeping
//! them in skald-core means consumers can depend on types without pulling in
//! tokio, rodio, or other heavy deps.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Audio types ───────────────────────────────────────────────────────────

/// Decoded audio: interleaved normalized samples plus format.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved samples in `[-1, 1]`.
    pub samples: Vec<f32>,
}

impl Waveform {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// World position a positional utterance should be emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialTarget {
    pub position: [f32; 3],
}

impl SpatialTarget {
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
        }
    }
}

// ─── Request types ─────────────────────────────────────────────────────────

/// Message class; only center announcements are debounced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    #[default]
    Normal,
    CenterAnnouncement,
}

/// One utterance to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub speaker: String,
    pub class: MessageClass,
    /// `Some` for positional playback, `None` for non-positional.
    pub target: Option<SpatialTarget>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
            class: MessageClass::Normal,
            target: None,
        }
    }

    pub fn center(mut self) -> Self {
        self.class = MessageClass::CenterAnnouncement;
        self
    }

    pub fn at(mut self, target: SpatialTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn is_positional(&self) -> bool {
        self.target.is_some()
    }
}

// ─── Configuration ─────────────────────────────────────────────────────────

/// Voice the engine falls back to when nothing else is configured.
pub const DEFAULT_VOICE_MODEL_URL: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0/en/en_GB/alba/medium/en_GB-alba-medium.onnx";

/// Window inside which an identical center announcement is suppressed.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(1500);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SkaldConfig {
    /// Base directory of the voice model cache.
    pub voices_dir: PathBuf,
    /// Directory the synthesis engine is unpacked into.
    pub install_dir: PathBuf,
    /// Explicit engine executable; resolved automatically when `None`.
    pub engine_path: Option<PathBuf>,
    pub default_model_url: String,
    pub default_speaker_index: u32,
    /// Additional voices registered at startup.
    pub voices: Vec<VoiceSpec>,
    pub debounce_window: Duration,
    /// Bound on a single engine run; unbounded when `None`.
    pub synthesis_timeout: Option<Duration>,
    /// Where temporary waveform files are written.
    pub temp_dir: PathBuf,
    /// Name of the local player, used to skip their own chat lines.
    pub local_player: Option<String>,
    pub skip_self: bool,
}

impl Default for SkaldConfig {
    fn default() -> Self {
        Self {
            voices_dir: PathBuf::from("voices"),
            install_dir: PathBuf::from("."),
            engine_path: None,
            default_model_url: DEFAULT_VOICE_MODEL_URL.into(),
            default_speaker_index: 0,
            voices: Vec::new(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            synthesis_timeout: None,
            temp_dir: std::env::temp_dir(),
            local_player: None,
            skip_self: true,
        }
    }
}

/// A voice given on the command line: `KEY=URL` or `KEY:SPEAKER=URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSpec {
    pub key: String,
    pub model_url: String,
    pub speaker_index: u32,
}

impl FromStr for VoiceSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVoiceSpec(s.to_string());
        let (lhs, url) = s.split_once('=').ok_or_else(invalid)?;
        let (key, speaker_index) = match lhs.split_once(':') {
            Some((key, speaker)) => (key, speaker.parse::<u32>().map_err(|_| invalid())?),
            None => (lhs, 0),
        };
        let key = key.trim();
        let url = url.trim();
        if key.is_empty() || url.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            key: key.to_string(),
            model_url: url.to_string(),
            speaker_index,
        })
    }
}

// ─── Status types ──────────────────────────────────────────────────────────

/// Cache status of one registered voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatus {
    pub key: String,
    pub model_url: String,
    pub speaker_index: u32,
    pub model_cached: bool,
    pub config_cached: bool,
}

// ─── Download types ────────────────────────────────────────────────────────

/// Download progress payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// File name being downloaded.
    pub model: String,
    pub percent: f32,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub status: String, // "downloading" | "complete"
}
