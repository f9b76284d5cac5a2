//! skald-lib: Speech engine.
//!
//! Voice model cache, synthesis subprocess, waveform decode, playback, and
//! HTTP API. Depends on skald-core for pure types and text processing.

pub mod download;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod registry;
pub mod server;
pub mod synth;

// Re-export skald-core for convenience
pub use skald_core;

pub use error::{FetchError, PlaybackError, SpeechError, SynthesisError};
pub use pipeline::{SpeakOutcome, SpeechPipeline};
pub use playback::{NullSink, PlaybackSink, RodioSink};
pub use registry::VoiceModelRegistry;
pub use synth::SynthesisInvoker;
