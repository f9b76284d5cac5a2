//! HTTP API for the skald speech pipeline.
//!
//! Runs on port 2004 by default. CORS-permissive so a host mod or overlay
//! can call it from anywhere on localhost.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use skald_core::announce::Announcement;
use skald_core::types::{SpatialTarget, SpeechRequest, VoiceStatus};
use skald_core::voice::{DEFAULT_VOICE_KEY, ModelDescriptor};

use crate::pipeline::SpeechPipeline;
use crate::playback::ListenerPose;
use crate::registry::{LoadStatus, ModelLoadReport};

pub const DEFAULT_PORT: u16 = 2004;

/// Build the axum router around a shared [`SpeechPipeline`].
pub fn router(pipeline: SpeechPipeline) -> Router {
    Router::new()
        .route("/speak", post(speak))
        .route("/announce", post(announce))
        .route("/voices", get(voices))
        .route("/voices/load", post(load_voices))
        .route("/voices/{key}", put(register_voice))
        .route("/listener", put(set_listener))
        .route("/stop", post(stop))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

#[derive(Deserialize)]
struct SpeakBody {
    text: String,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    center: bool,
    #[serde(default)]
    position: Option<[f32; 3]>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct AnnounceResponse {
    ok: bool,
    queued: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

#[derive(Deserialize)]
struct ListenerBody {
    position: [f32; 3],
}

#[derive(Deserialize)]
struct RegisterBody {
    model_url: String,
    #[serde(default)]
    speaker_index: u32,
}

#[derive(Serialize)]
struct RegisterResponse {
    ok: bool,
    /// Present when the default voice was replaced and models reloaded.
    reloaded: Option<Vec<LoadReportBody>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadReportBody {
    pub key: String,
    pub ok: bool,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl From<&ModelLoadReport> for LoadReportBody {
    fn from(report: &ModelLoadReport) -> Self {
        let (status, error) = match &report.result {
            Ok(LoadStatus::Cached) => (Some("cached".to_string()), None),
            Ok(LoadStatus::Downloaded) => (Some("downloaded".to_string()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            key: report.key.clone(),
            ok: report.is_ok(),
            status,
            error,
        }
    }
}

fn report_bodies(reports: &[ModelLoadReport]) -> Vec<LoadReportBody> {
    reports.iter().map(LoadReportBody::from).collect()
}

async fn speak(
    State(pipeline): State<SpeechPipeline>,
    Json(req): Json<SpeakBody>,
) -> Json<OkResponse> {
    let mut request = SpeechRequest::new(
        req.text,
        req.speaker.unwrap_or_else(|| DEFAULT_VOICE_KEY.to_string()),
    );
    if req.center {
        request = request.center();
    }
    if let Some(position) = req.position {
        request = request.at(SpatialTarget { position });
    }
    pipeline.submit(request);
    Json(OkResponse { ok: true })
}

async fn announce(
    State(pipeline): State<SpeechPipeline>,
    Json(announcement): Json<Announcement>,
) -> Json<AnnounceResponse> {
    let queued = pipeline.announce(announcement);
    Json(AnnounceResponse { ok: true, queued })
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn playback_failed(e: crate::error::PlaybackError) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            ok: false,
            error: e.to_string(),
        }),
    )
}

async fn set_listener(
    State(pipeline): State<SpeechPipeline>,
    Json(body): Json<ListenerBody>,
) -> Result<Json<OkResponse>, ApiError> {
    pipeline
        .sink()
        .set_listener(ListenerPose::at(body.position))
        .map_err(playback_failed)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn stop(State(pipeline): State<SpeechPipeline>) -> Result<Json<OkResponse>, ApiError> {
    pipeline.sink().stop().map_err(playback_failed)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn voices(State(pipeline): State<SpeechPipeline>) -> Json<Vec<VoiceStatus>> {
    Json(pipeline.registry().status())
}

async fn load_voices(State(pipeline): State<SpeechPipeline>) -> Json<Vec<LoadReportBody>> {
    let reports = pipeline.registry().ensure_all_loaded().await;
    Json(report_bodies(&reports))
}

async fn register_voice(
    State(pipeline): State<SpeechPipeline>,
    Path(key): Path<String>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let registry = pipeline.registry();
    let descriptor =
        ModelDescriptor::new(key, body.model_url, body.speaker_index, registry.base_dir()).map_err(
            |e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        ok: false,
                        error: e.to_string(),
                    }),
                )
            },
        )?;

    let reloaded = registry
        .register_and_refresh(descriptor)
        .await
        .map(|reports| report_bodies(&reports));
    Ok(Json(RegisterResponse { ok: true, reloaded }))
}
