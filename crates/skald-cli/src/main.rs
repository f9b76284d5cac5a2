//! skald CLI: standalone speech server.
//!
//! ```text
//! skald serve [--port 2004] [--host 127.0.0.1] [--voice Haldor=URL ...] [--mute]
//! skald fetch [--voices-dir voices] [--voice KEY:N=URL ...]
//! skald speak "hello there" [--speaker Haldor] [--center] [--server http://localhost:2004]
//! skald announce '{"type":"dream","text":"..."}' [--server ...]
//! skald voices [--server ...]
//! skald listener X Y Z [--server ...]
//! skald stop [--server ...]
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skald_lib::download::HttpFetcher;
use skald_lib::playback::ListenerPose;
use skald_lib::registry::{LoadStatus, ModelLoadReport, VoiceModelRegistry};
use skald_lib::server::{self, DEFAULT_PORT};
use skald_lib::skald_core::types::{DEFAULT_VOICE_MODEL_URL, SkaldConfig, VoiceSpec};
use skald_lib::{NullSink, PlaybackSink, RodioSink, SpeechPipeline};

const DEFAULT_SERVER: &str = "http://localhost:2004";

/// skald: speech server for in-game dialogue
#[derive(Parser)]
#[command(name = "skald", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the skald speech server
    Serve {
        /// Listen port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Discard audio instead of opening an output device
        #[arg(long)]
        mute: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Download every configured voice model without starting the server
    Fetch {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Send text to the running server for speech
    Speak {
        /// Text to speak
        text: String,
        /// Voice key
        #[arg(long)]
        speaker: Option<String>,
        /// Treat as a center-screen announcement (debounced)
        #[arg(long)]
        center: bool,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Send a raw announcement (JSON) to the running server
    Announce {
        json: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// List registered voices and their cache state
    Voices {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Move the listener used for positional speech
    Listener {
        #[arg(allow_negative_numbers = true)]
        x: f32,
        #[arg(allow_negative_numbers = true)]
        y: f32,
        #[arg(allow_negative_numbers = true)]
        z: f32,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Stop all speech
    Stop {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Voice model cache directory
    #[arg(long, default_value = "voices")]
    voices_dir: PathBuf,
    /// Directory the engine archive is unpacked into
    #[arg(long, default_value = ".")]
    install_dir: PathBuf,
    /// Engine executable; found automatically when omitted
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Model URL of the default voice
    #[arg(long, default_value = DEFAULT_VOICE_MODEL_URL)]
    default_model: String,
    /// Speaker index of the default voice
    #[arg(long, default_value_t = 0)]
    speaker: u32,
    /// Extra voice, `KEY=URL` or `KEY:SPEAKER=URL` (repeatable)
    #[arg(long = "voice")]
    voices: Vec<VoiceSpec>,
    /// Center announcement debounce window in milliseconds
    #[arg(long, default_value_t = 1500)]
    debounce_ms: u64,
    /// Kill the engine after this many seconds
    #[arg(long)]
    synth_timeout_secs: Option<u64>,
    /// Directory for temporary waveform files
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Local player name; their own chat lines are not spoken
    #[arg(long)]
    local_player: Option<String>,
    /// Speak the local player's own chat lines too
    #[arg(long)]
    speak_self: bool,
}

impl EngineArgs {
    fn into_config(self) -> SkaldConfig {
        let defaults = SkaldConfig::default();
        SkaldConfig {
            voices_dir: self.voices_dir,
            install_dir: self.install_dir,
            engine_path: self.engine,
            default_model_url: self.default_model,
            default_speaker_index: self.speaker,
            voices: self.voices,
            debounce_window: Duration::from_millis(self.debounce_ms),
            synthesis_timeout: self.synth_timeout_secs.map(Duration::from_secs),
            temp_dir: self.temp_dir.unwrap_or(defaults.temp_dir),
            local_player: self.local_player,
            skip_self: !self.speak_self,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            mute,
            engine,
        } => {
            let config = engine.into_config();
            let sink = open_sink(mute);
            let pipeline = SpeechPipeline::from_config(&config, sink)?;
            info!("engine: {}", pipeline.invoker().engine().display());

            let reports = pipeline.registry().ensure_all_loaded().await;
            log_reports(&reports);

            let app = server::router(pipeline);
            let addr = format!("{host}:{port}");
            eprintln!("skald listening on {addr}");

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }

        Command::Fetch { engine } => {
            let config = engine.into_config();
            let fetcher = HttpFetcher::new().with_progress(|p| {
                eprint!(
                    "\r{}: {:5.1}% ({}/{} bytes)",
                    p.model, p.percent, p.bytes_done, p.bytes_total
                );
                if p.status == "complete" {
                    eprintln!();
                }
            });
            let registry = VoiceModelRegistry::from_config(&config, Arc::new(fetcher))?;
            let reports = registry.ensure_all_loaded().await;
            log_reports(&reports);
            if reports.iter().any(|r| !r.is_ok()) {
                return Err("some voices failed to download".into());
            }
        }

        Command::Speak {
            text,
            speaker,
            center,
            server,
        } => {
            let mut body = serde_json::json!({ "text": text, "center": center });
            if let Some(speaker) = speaker {
                body["speaker"] = speaker.into();
            }
            let resp = reqwest::Client::new()
                .post(format!("{server}/speak"))
                .json(&body)
                .send()
                .await?;
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Announce { json, server } => {
            let body: serde_json::Value = serde_json::from_str(&json)?;
            let resp = reqwest::Client::new()
                .post(format!("{server}/announce"))
                .json(&body)
                .send()
                .await?;
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Listener { x, y, z, server } => {
            let resp = reqwest::Client::new()
                .put(format!("{server}/listener"))
                .json(&serde_json::json!({ "position": [x, y, z] }))
                .send()
                .await?;
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Stop { server } => {
            let resp = reqwest::Client::new()
                .post(format!("{server}/stop"))
                .send()
                .await?;
            println!("{}", resp.text().await.unwrap_or_default());
        }

        Command::Voices { server } => {
            let resp = reqwest::Client::new()
                .get(format!("{server}/voices"))
                .send()
                .await?;
            println!("{}", resp.text().await.unwrap_or_default());
        }
    }

    Ok(())
}

fn open_sink(mute: bool) -> Arc<dyn PlaybackSink> {
    if mute {
        return Arc::new(NullSink);
    }
    match RodioSink::new(ListenerPose::default()) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("no audio output ({e}), speech will be discarded");
            Arc::new(NullSink)
        }
    }
}

fn log_reports(reports: &[ModelLoadReport]) {
    for report in reports {
        match &report.result {
            Ok(LoadStatus::Cached) => info!("voice '{}': cached", report.key),
            Ok(LoadStatus::Downloaded) => info!("voice '{}': downloaded", report.key),
            Err(e) => warn!("voice '{}': {e}", report.key),
        }
    }
}
