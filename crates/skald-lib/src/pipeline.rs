//! Speech pipeline: text → voice → engine → decode → sink.
//!
//! ```text
//! speak(request)
//!     → strip markup → join lines → debounce (center announcements only)
//!     → registry.resolve(speaker) → invoker.synthesize(text, voice)
//!     → decode_wav(bytes) → sink.play(waveform, target)
//! ```
//!
//! Stages run strictly in order within one request; separate requests run
//! as independent tasks and may finish in any order. Every failure is logged
//! once and ends that request only: callers never see an error.

use std::sync::Arc;

use tracing::{debug, warn};

use skald_core::announce::{AnnounceContext, Announcement};
use skald_core::debounce::DebounceLedger;
use skald_core::text_prep::{collapse_whitespace, is_speakable, strip_markup};
use skald_core::types::{MessageClass, SkaldConfig, SpatialTarget, SpeechRequest};
use skald_core::wav::decode_wav;

use crate::download::{FileFetcher, HttpFetcher};
use crate::engine::resolve_engine;
use crate::error::{ConfigError, SpeechError};
use crate::playback::PlaybackSink;
use crate::registry::VoiceModelRegistry;
use crate::synth::SynthesisInvoker;

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Audio was handed to the sink.
    Played {
        channels: u16,
        sample_rate: u32,
        frames: usize,
    },
    /// Same center announcement was spoken less than one window ago.
    Debounced,
    /// Nothing pronounceable left after stripping markup.
    Empty,
    /// A stage failed; the failure was logged.
    Failed { stage: &'static str },
}

/// Cloneable handle; clones share the registry, ledger and sink.
#[derive(Clone)]
pub struct SpeechPipeline {
    registry: Arc<VoiceModelRegistry>,
    invoker: Arc<SynthesisInvoker>,
    sink: Arc<dyn PlaybackSink>,
    ledger: Arc<DebounceLedger>,
    announce_ctx: Arc<AnnounceContext>,
}

impl SpeechPipeline {
    pub fn new(
        registry: Arc<VoiceModelRegistry>,
        invoker: SynthesisInvoker,
        sink: Arc<dyn PlaybackSink>,
        ledger: Arc<DebounceLedger>,
    ) -> Self {
        Self {
            registry,
            invoker: Arc::new(invoker),
            sink,
            ledger,
            announce_ctx: Arc::new(AnnounceContext::default()),
        }
    }

    /// Build the whole engine from `config`, fetching models over HTTP.
    pub fn from_config(
        config: &SkaldConfig,
        sink: Arc<dyn PlaybackSink>,
    ) -> Result<Self, ConfigError> {
        Self::from_config_with_fetcher(config, sink, Arc::new(HttpFetcher::new()))
    }

    pub fn from_config_with_fetcher(
        config: &SkaldConfig,
        sink: Arc<dyn PlaybackSink>,
        fetcher: Arc<dyn FileFetcher>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(VoiceModelRegistry::from_config(config, fetcher)?);
        let engine = resolve_engine(config.engine_path.as_deref(), &config.install_dir);
        let invoker =
            SynthesisInvoker::new(engine, &config.temp_dir).with_timeout(config.synthesis_timeout);
        let ledger = Arc::new(DebounceLedger::new(config.debounce_window));

        Ok(Self::new(registry, invoker, sink, ledger).with_announce_context(AnnounceContext {
            local_player: config.local_player.clone(),
            skip_self: config.skip_self,
        }))
    }

    pub fn with_announce_context(mut self, ctx: AnnounceContext) -> Self {
        self.announce_ctx = Arc::new(ctx);
        self
    }

    pub fn registry(&self) -> &Arc<VoiceModelRegistry> {
        &self.registry
    }

    pub fn invoker(&self) -> &SynthesisInvoker {
        &self.invoker
    }

    pub fn sink(&self) -> &Arc<dyn PlaybackSink> {
        &self.sink
    }

    /// Speak one request to completion of hand-off to the sink.
    pub async fn speak(&self, request: SpeechRequest) -> SpeakOutcome {
        // The engine reads exactly one line per run.
        let text = collapse_whitespace(&strip_markup(&request.text));
        if !is_speakable(&text) {
            debug!("speak: nothing to say in {:?}", request.text);
            return SpeakOutcome::Empty;
        }

        if request.class == MessageClass::CenterAnnouncement && !self.ledger.admit(&text) {
            debug!("speak: debounced {text:?}");
            return SpeakOutcome::Debounced;
        }

        match self.render(&text, &request.speaker, request.target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let stage = e.stage();
                warn!("speak [{}] failed at {stage}: {e}", request.speaker);
                SpeakOutcome::Failed { stage }
            }
        }
    }

    async fn render(
        &self,
        text: &str,
        speaker: &str,
        target: Option<SpatialTarget>,
    ) -> Result<SpeakOutcome, SpeechError> {
        let voice = self.registry.resolve(speaker)?;
        debug!("speak [{speaker}]: voice '{}' ({} chars)", voice.key, text.len());

        let wav = self.invoker.synthesize(text, &voice).await?;
        let bytes = wav.read().await.map_err(SpeechError::Read)?;
        let decoded = decode_wav(&bytes);
        // Temp file goes whether or not decode succeeded.
        drop(wav);
        let waveform = decoded?;

        let outcome = SpeakOutcome::Played {
            channels: waveform.channels,
            sample_rate: waveform.sample_rate,
            frames: waveform.frames(),
        };
        self.sink.play(waveform, target)?;
        Ok(outcome)
    }

    /// Fire-and-forget [`speak`](Self::speak) on the runtime.
    pub fn submit(&self, request: SpeechRequest) {
        let this = self.clone();
        tokio::spawn(async move {
            this.speak(request).await;
        });
    }

    /// Route a host announcement and submit it. Returns `false` when the
    /// announcement is not to be spoken at all.
    pub fn announce(&self, announcement: Announcement) -> bool {
        match announcement.into_request(&self.announce_ctx) {
            Some(request) => {
                self.submit(request);
                true
            }
            None => false,
        }
    }
}
