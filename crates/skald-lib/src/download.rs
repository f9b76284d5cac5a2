//! Voice model file fetcher with progress reporting via callback.
//!
//! Bodies stream into `<dest>.partial` and are renamed onto `<dest>` only
//! once complete, so a half-written model is never mistaken for a cached one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use skald_core::types::DownloadProgress;

use crate::error::FetchError;

/// HTTP GET → local file.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes in the final
    /// file. `dest` must only appear once fully written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

pub type ProgressFn = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// [`FileFetcher`] over `reqwest`.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
    on_progress: Option<ProgressFn>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report progress for every received chunk.
    pub fn with_progress(
        mut self,
        on_progress: impl Fn(DownloadProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    fn report(&self, name: &str, bytes_done: u64, bytes_total: u64, status: &str) {
        if let Some(cb) = &self.on_progress {
            let percent = if bytes_total == 0 {
                100.0
            } else {
                (bytes_done as f32 / bytes_total as f32 * 100.0).min(100.0)
            };
            cb(DownloadProgress {
                model: name.to_string(),
                percent,
                bytes_done,
                bytes_total,
                status: status.to_string(),
            });
        }
    }

    /// GET `url`, asking for the bytes after `from` when it is non-zero.
    async fn send(&self, url: &str, from: u64) -> Result<reqwest::Response, FetchError> {
        let mut req = self.client.get(url);
        if from > 0 {
            req = req.header(reqwest::header::RANGE, format!("bytes={from}-"));
        }
        req.send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    async fn promote(
        &self,
        url: &str,
        name: &str,
        partial: &Path,
        dest: &Path,
        bytes: u64,
    ) -> Result<u64, FetchError> {
        tokio::fs::rename(partial, dest)
            .await
            .map_err(io_error(dest))?;

        self.report(name, bytes, bytes, "complete");
        info!("downloaded {url} to {}", dest.display());
        Ok(bytes)
    }
}

/// Complete length from a `416` reply's `Content-Range: bytes */N`.
fn unsatisfied_range_total(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .strip_prefix("bytes */")?
        .trim()
        .parse()
        .ok()
}

/// Path of the in-progress download for `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        if let Some(dir) = dest.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;
        }

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = partial_path(dest);
        let mut existing_size = tokio::fs::metadata(&partial)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if existing_size > 0 {
            debug!("resuming {name} from byte {existing_size}");
        }

        let mut resp = self.send(url, existing_size).await?;

        // Nothing left after the partial: either it is already the whole
        // file, or it does not belong to this URL any more.
        if existing_size > 0 && resp.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            if unsatisfied_range_total(&resp) == Some(existing_size) {
                debug!("{name}: partial already complete");
                return self.promote(url, &name, &partial, dest, existing_size).await;
            }
            warn!("{name}: partial does not match remote, restarting");
            tokio::fs::remove_file(&partial)
                .await
                .map_err(io_error(&partial))?;
            existing_size = 0;
            resp = self.send(url, 0).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        // A 200 to a ranged request means the server ignored the range.
        let resuming = existing_size > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let offset = if resuming { existing_size } else { 0 };

        let total_size = if resuming {
            resp.headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.rsplit('/').next())
                .and_then(|s| s.parse::<u64>().ok())
                .or_else(|| resp.content_length().map(|len| len + offset))
                .unwrap_or(0)
        } else {
            resp.content_length().unwrap_or(0)
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resuming)
            .truncate(!resuming)
            .open(&partial)
            .await
            .map_err(io_error(&partial))?;

        let mut bytes_done = offset;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_error(&partial))?;

            bytes_done += chunk.len() as u64;
            self.report(&name, bytes_done, total_size.max(bytes_done), "downloading");
        }

        file.flush().await.map_err(io_error(&partial))?;
        drop(file);

        self.promote(url, &name, &partial, dest, bytes_done).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use std::sync::Mutex;

    const BODY: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn ranged(headers: HeaderMap) -> Response {
        let start = headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("bytes="))
            .and_then(|s| s.trim_end_matches('-').parse::<usize>().ok());
        match start {
            Some(start) if start >= BODY.len() => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", BODY.len()))],
            )
                .into_response(),
            Some(start) => (
                StatusCode::PARTIAL_CONTENT,
                [(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{}/{}", BODY.len() - 1, BODY.len()),
                )],
                BODY[start..].to_vec(),
            )
                .into_response(),
            None => BODY.to_vec().into_response(),
        }
    }

    fn router() -> Router {
        Router::new()
            .route("/plain/voice.onnx", get(|| async { BODY.to_vec() }))
            .route("/ranged/voice.onnx", get(ranged))
    }

    #[tokio::test]
    async fn fetch_writes_body_and_leaves_no_partial() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/voice.onnx");

        let n = HttpFetcher::new()
            .fetch(&format!("{base}/plain/voice.onnx"), &dest)
            .await
            .unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn fetch_reports_http_status() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.onnx");

        let err = HttpFetcher::new()
            .fetch(&format!("{base}/nope.onnx"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status, .. } if status == 404));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn fetch_reports_unreachable_host() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        // Bind then drop a listener so the port is closed.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let err = HttpFetcher::new()
            .fetch(&format!("http://127.0.0.1:{port}/voice.onnx"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn fetch_resumes_partial_download() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        std::fs::write(partial_path(&dest), &BODY[..10]).unwrap();

        let n = HttpFetcher::new()
            .fetch(&format!("{base}/ranged/voice.onnx"), &dest)
            .await
            .unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn fetch_restarts_when_range_is_ignored() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        std::fs::write(partial_path(&dest), b"stale bytes").unwrap();

        HttpFetcher::new()
            .fetch(&format!("{base}/plain/voice.onnx"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn complete_partial_is_promoted_on_416() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        std::fs::write(partial_path(&dest), BODY).unwrap();

        let n = HttpFetcher::new()
            .fetch(&format!("{base}/ranged/voice.onnx"), &dest)
            .await
            .unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn oversized_partial_restarts_on_416() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        std::fs::write(partial_path(&dest), [b'x'; 50]).unwrap();

        let n = HttpFetcher::new()
            .fetch(&format!("{base}/ranged/voice.onnx"), &dest)
            .await
            .unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn fetch_reports_progress() {
        let base = serve(router()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.onnx");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        HttpFetcher::new()
            .with_progress(move |p| sink.lock().unwrap().push(p))
            .fetch(&format!("{base}/plain/voice.onnx"), &dest)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.status, "complete");
        assert_eq!(last.model, "voice.onnx");
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.bytes_done, BODY.len() as u64);
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/v/a/voice.onnx.json")),
            Path::new("/v/a/voice.onnx.json.partial")
        );
    }
}
