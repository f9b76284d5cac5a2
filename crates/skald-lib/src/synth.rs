//! Synthesis invocation: one engine process per utterance.
//!
//! ```text
//! synthesize(text, voice)
//!     → spawn engine --model M --config C --speaker N --output_file <tmp>.wav
//!     → stdin: "text\n", then close
//!     → stderr: drained concurrently, classified after exit
//!     → <tmp>.wav exists? → SynthesizedWav : NoOutput
//! ```
//!
//! The child is spawned with `kill_on_drop`, so any early return (including a
//! timeout or a dropped future) kills and reaps it. The returned
//! [`SynthesizedWav`] deletes its file when dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, warn};

use skald_core::voice::ModelDescriptor;

use crate::error::SynthesisError;

/// Substring marking an informational engine diagnostic line.
pub const INFO_MARKER: &str = "[info]";

/// How a line of engine diagnostics is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    Info,
    Error,
}

/// Classify one diagnostic line by the informational marker convention.
pub fn classify_diagnostic(line: &str) -> Diagnostic {
    if line.contains(INFO_MARKER) {
        Diagnostic::Info
    } else {
        Diagnostic::Error
    }
}

fn log_diagnostics(stderr: &str) {
    for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match classify_diagnostic(line) {
            Diagnostic::Info => debug!("engine: {line}"),
            Diagnostic::Error => error!("engine: {line}"),
        }
    }
}

/// A waveform file written by the engine, deleted on drop.
#[derive(Debug)]
pub struct SynthesizedWav {
    path: PathBuf,
}

impl SynthesizedWav {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for SynthesizedWav {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove {}: {e}", self.path.display());
            }
        }
    }
}

/// Drives the external engine, one process per call. Holds no mutable
/// state, so concurrent calls are independent.
#[derive(Debug, Clone)]
pub struct SynthesisInvoker {
    engine: PathBuf,
    temp_dir: PathBuf,
    timeout: Option<Duration>,
}

impl SynthesisInvoker {
    pub fn new(engine: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            temp_dir: temp_dir.into(),
            timeout: None,
        }
    }

    /// Kill the engine and fail if a run takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// Unique destination for one run's waveform.
    fn temp_wav_path(&self) -> PathBuf {
        self.temp_dir
            .join(format!("skald_tts_{}.wav", uuid::Uuid::new_v4().simple()))
    }

    /// Command line for one run.
    pub fn command_args(descriptor: &ModelDescriptor, output: &Path) -> Vec<std::ffi::OsString> {
        vec![
            "--model".into(),
            descriptor.model_path.clone().into(),
            "--config".into(),
            descriptor.config_path.clone().into(),
            "--speaker".into(),
            descriptor.speaker_index.to_string().into(),
            "--output_file".into(),
            output.into(),
        ]
    }

    /// Synthesize `text` with `descriptor`'s voice.
    ///
    /// Success is decided by the output file alone: a non-zero exit or error
    /// diagnostics are logged but do not fail the call if audio was written.
    pub async fn synthesize(
        &self,
        text: &str,
        descriptor: &ModelDescriptor,
    ) -> Result<SynthesizedWav, SynthesisError> {
        for path in [&descriptor.model_path, &descriptor.config_path] {
            if !path.is_file() {
                return Err(SynthesisError::ModelMissing(path.clone()));
            }
        }

        let output = self.temp_wav_path();
        let mut child = Command::new(&self.engine)
            .args(Self::command_args(descriptor, &output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SynthesisError::Spawn {
                engine: self.engine.clone(),
                source,
            })?;

        // Drain stderr concurrently so a chatty engine can't block on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{text}\n");
            // An engine that exits early closes the pipe; its output decides.
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!("engine stdin write failed: {e}");
            } else if let Err(e) = stdin.flush().await {
                warn!("engine stdin flush failed: {e}");
            }
            drop(stdin);
        }

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("engine exceeded {limit:?}, killing");
                    let _ = child.kill().await;
                    if let Some(task) = stderr_task {
                        task.abort();
                    }
                    let _ = tokio::fs::remove_file(&output).await;
                    return Err(SynthesisError::Timeout(limit));
                }
            },
            None => child.wait().await?,
        };

        if let Some(task) = stderr_task {
            if let Ok(stderr) = task.await {
                log_diagnostics(&stderr);
            }
        }

        if !status.success() {
            debug!("engine exited with {status}");
        }

        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            Ok(SynthesizedWav { path: output })
        } else {
            Err(SynthesisError::NoOutput(output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_marker_classification() {
        assert_eq!(
            classify_diagnostic("[2024-01-01] [piper] [info] Loaded voice"),
            Diagnostic::Info
        );
        assert_eq!(
            classify_diagnostic("terminate called after throwing"),
            Diagnostic::Error
        );
    }

    #[test]
    fn command_args_order() {
        let d = ModelDescriptor::new(
            "default",
            "https://models.test/alba.onnx",
            4,
            Path::new("/v"),
        )
        .unwrap();
        let args = SynthesisInvoker::command_args(&d, Path::new("/tmp/out.wav"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--model",
                "/v/alba/alba.onnx",
                "--config",
                "/v/alba/alba.onnx.json",
                "--speaker",
                "4",
                "--output_file",
                "/tmp/out.wav",
            ]
        );
    }

    #[test]
    fn temp_paths_are_unique() {
        let invoker = SynthesisInvoker::new("piper", "/tmp");
        assert_ne!(invoker.temp_wav_path(), invoker.temp_wav_path());
    }

    #[test]
    fn synthesized_wav_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        drop(SynthesizedWav { path: path.clone() });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_model_fails_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let d = ModelDescriptor::new("default", "https://models.test/a.onnx", 0, dir.path())
            .unwrap();
        let invoker = SynthesisInvoker::new("/definitely/not/here", dir.path());
        let err = invoker.synthesize("Hello", &d).await.unwrap_err();
        assert!(matches!(err, SynthesisError::ModelMissing(p) if p == d.model_path));
    }

    #[cfg(unix)]
    mod engine {
        use super::*;
        use skald_core::wav::write_wav;
        use std::os::unix::fs::PermissionsExt;

        struct Fixture {
            dir: tempfile::TempDir,
            descriptor: ModelDescriptor,
        }

        /// A fake engine: records argv and stdin, prints diagnostics, and
        /// copies `fixture.wav` to `--output_file` unless told not to.
        fn fixture(script_body: &str) -> (Fixture, PathBuf) {
            let dir = tempfile::tempdir().unwrap();
            let descriptor =
                ModelDescriptor::new("default", "https://models.test/alba.onnx", 2, dir.path())
                    .unwrap();
            std::fs::create_dir_all(descriptor.cache_dir().unwrap()).unwrap();
            std::fs::write(&descriptor.model_path, b"weights").unwrap();
            std::fs::write(&descriptor.config_path, b"{}").unwrap();
            std::fs::write(
                dir.path().join("fixture.wav"),
                write_wav(&[0, 1000, -1000, 0], 1, 22050),
            )
            .unwrap();

            let script = dir.path().join("engine.sh");
            let body = format!(
                "#!/bin/sh\nD='{}'\nout=''\nprev=''\nfor a in \"$@\"; do\n  if [ \"$prev\" = '--output_file' ]; then out=\"$a\"; fi\n  prev=\"$a\"\ndone\necho \"$@\" > \"$D/argv.txt\"\n{script_body}\n",
                dir.path().display()
            );
            std::fs::write(&script, body).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            (Fixture { dir, descriptor }, script)
        }

        const COPY_WAV: &str = "cat > \"$D/stdin.txt\"\necho '[piper] [info] Loaded voice' >&2\ncp \"$D/fixture.wav\" \"$out\"";

        #[tokio::test]
        async fn produces_wav_and_feeds_stdin() {
            let (fx, script) = fixture(COPY_WAV);
            let invoker = SynthesisInvoker::new(&script, fx.dir.path());

            let wav = invoker.synthesize("Hello there", &fx.descriptor).await.unwrap();
            assert!(wav.path().starts_with(fx.dir.path()));
            assert_eq!(wav.read().await.unwrap().len(), 44 + 8);

            let stdin = std::fs::read_to_string(fx.dir.path().join("stdin.txt")).unwrap();
            assert_eq!(stdin, "Hello there\n");
            let argv = std::fs::read_to_string(fx.dir.path().join("argv.txt")).unwrap();
            assert!(argv.contains("--speaker 2"));
            assert!(argv.contains(&format!("--config {}", fx.descriptor.config_path.display())));

            let path = wav.path().to_path_buf();
            drop(wav);
            assert!(!path.exists());
        }

        #[tokio::test]
        async fn nonzero_exit_with_output_is_success() {
            let body = format!("{COPY_WAV}\necho 'warning: odd phoneme' >&2\nexit 3");
            let (fx, script) = fixture(&body);
            let invoker = SynthesisInvoker::new(&script, fx.dir.path());
            assert!(invoker.synthesize("Hi", &fx.descriptor).await.is_ok());
        }

        #[tokio::test]
        async fn no_output_file_is_error() {
            let (fx, script) = fixture("cat > /dev/null\necho 'boom' >&2");
            let invoker = SynthesisInvoker::new(&script, fx.dir.path());
            let err = invoker.synthesize("Hi", &fx.descriptor).await.unwrap_err();
            assert!(matches!(err, SynthesisError::NoOutput(_)));
        }

        #[tokio::test]
        async fn engine_ignoring_stdin_still_succeeds() {
            let (fx, script) = fixture("cp \"$D/fixture.wav\" \"$out\"");
            let invoker = SynthesisInvoker::new(&script, fx.dir.path());
            assert!(invoker.synthesize("Hi", &fx.descriptor).await.is_ok());
        }

        #[tokio::test]
        async fn hung_engine_times_out() {
            let (fx, script) = fixture("sleep 30");
            let invoker = SynthesisInvoker::new(&script, fx.dir.path())
                .with_timeout(Some(Duration::from_millis(200)));
            let err = invoker.synthesize("Hi", &fx.descriptor).await.unwrap_err();
            assert!(matches!(err, SynthesisError::Timeout(_)));
        }

        #[tokio::test]
        async fn unlaunchable_engine_is_spawn_error() {
            let (fx, _script) = fixture("");
            let invoker =
                SynthesisInvoker::new(fx.dir.path().join("missing-engine"), fx.dir.path());
            let err = invoker.synthesize("Hi", &fx.descriptor).await.unwrap_err();
            assert!(matches!(err, SynthesisError::Spawn { .. }));
        }

        #[tokio::test]
        async fn concurrent_runs_are_independent() {
            let (fx, script) = fixture(COPY_WAV);
            let invoker = SynthesisInvoker::new(&script, fx.dir.path());
            let (a, b) = tokio::join!(
                invoker.synthesize("one", &fx.descriptor),
                invoker.synthesize("two", &fx.descriptor),
            );
            let (a, b) = (a.unwrap(), b.unwrap());
            assert_ne!(a.path(), b.path());
        }
    }
}
