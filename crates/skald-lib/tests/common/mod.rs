#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::routing::get;

use skald_lib::PlaybackError;
use skald_lib::PlaybackSink;
use skald_lib::download::HttpFetcher;
use skald_lib::registry::VoiceModelRegistry;
use skald_lib::skald_core::debounce::DebounceLedger;
use skald_lib::skald_core::types::{SpatialTarget, Waveform};
use skald_lib::skald_core::wav::write_wav;
use skald_lib::{SpeechPipeline, SynthesisInvoker};

pub const FIXTURE_SAMPLES: [i16; 6] = [0, 8192, -8192, 16384, -16384, 0];
pub const FIXTURE_RATE: u32 = 22050;

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Model host with one voice, `alba`. Everything else is a 404.
pub async fn model_host() -> String {
    let router = Router::new()
        .route("/voices/alba.onnx", get(|| async { b"onnx-weights".to_vec() }))
        .route(
            "/voices/alba.onnx.json",
            get(|| async { r#"{"audio":{"sample_rate":22050}}"# }),
        );
    serve(router).await
}

/// Sink that keeps everything it is given.
#[derive(Default)]
pub struct CaptureSink {
    pub played: Mutex<Vec<(Waveform, Option<SpatialTarget>)>>,
}

impl CaptureSink {
    pub fn count(&self) -> usize {
        self.played.lock().unwrap().len()
    }
}

impl PlaybackSink for CaptureSink {
    fn play(&self, waveform: Waveform, target: Option<SpatialTarget>) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push((waveform, target));
        Ok(())
    }
}

/// Engine that logs every stdin line to `calls.txt` and copies `fixture.wav`
/// to `--output_file`.
pub const COPY_ENGINE: &str = "while IFS= read -r line; do echo \"$line\" >> \"$D/calls.txt\"; done\necho '[piper] [info] Real-time factor: 0.1' >&2\ncp \"$D/fixture.wav\" \"$out\"";

/// Engine that logs its input but writes an undecodable file.
pub const GARBAGE_ENGINE: &str = "IFS= read -r line\necho \"$line\" >> \"$D/calls.txt\"\necho 'not a wave file' > \"$out\"";

#[cfg(unix)]
pub fn fake_engine(dir: &Path, script_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(
        dir.join("fixture.wav"),
        write_wav(&FIXTURE_SAMPLES, 1, FIXTURE_RATE),
    )
    .unwrap();
    let script = dir.join("engine.sh");
    let body = format!(
        "#!/bin/sh\nD='{}'\nout=''\nprev=''\nfor a in \"$@\"; do\n  if [ \"$prev\" = '--output_file' ]; then out=\"$a\"; fi\n  prev=\"$a\"\ndone\n{script_body}\n",
        dir.display()
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

pub fn engine_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.txt"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Files left in the synthesis temp directory.
pub fn leftover_temp_files(temp_dir: &Path) -> usize {
    std::fs::read_dir(temp_dir).map(|d| d.count()).unwrap_or(0)
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub temp_dir: PathBuf,
    pub registry: Arc<VoiceModelRegistry>,
    pub sink: Arc<CaptureSink>,
    pub pipeline: SpeechPipeline,
}

#[cfg(unix)]
pub fn harness(script_body: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let temp_dir = dir.path().join("tmp");
    std::fs::create_dir_all(&temp_dir).unwrap();

    let engine = fake_engine(dir.path(), script_body);
    let registry = Arc::new(VoiceModelRegistry::new(
        dir.path().join("voices"),
        Arc::new(HttpFetcher::new()),
    ));
    let sink = Arc::new(CaptureSink::default());
    let pipeline = SpeechPipeline::new(
        registry.clone(),
        SynthesisInvoker::new(engine, &temp_dir),
        sink.clone(),
        Arc::new(DebounceLedger::default()),
    );

    Harness {
        dir,
        temp_dir,
        registry,
        sink,
        pipeline,
    }
}
