//! REST API of the downloader
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /` | [`root`] |
//! | `GET /health` | [`health`] |
//! | `GET /track-info?url=` | [`track_info`] |
//! | `POST /download?url=&format=&download_all=&attach_metadata=` | [`download`] |

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::downloader::{DownloadBody, Downloader};
use crate::error::DownloadError;
use fssoundcloud::ItemInfo;

/// Error rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// 500 carrying a summary of `err`
    pub fn download_failed(err: &DownloadError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Download failed: {}", err.client_message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackInfoQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: String,
    #[serde(default = "default_format")]
    pub format: String,
    /// Accepted for compatibility, collections always produce an archive
    #[serde(default)]
    pub download_all: bool,
    #[serde(default = "default_true")]
    pub attach_metadata: bool,
}

fn default_format() -> String {
    "mp3".to_string()
}

fn default_true() -> bool {
    true
}

pub fn create_router(downloader: Arc<Downloader>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/track-info", get(track_info))
        .route("/download", post(download))
        .with_state(downloader)
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "FreeSound API",
        "status": "running",
    }))
}

/// GET /health
pub async fn health(State(downloader): State<Arc<Downloader>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "ffmpeg_available": downloader.ffmpeg_available().await,
    }))
}

/// GET /track-info
pub async fn track_info(
    State(downloader): State<Arc<Downloader>>,
    Query(query): Query<TrackInfoQuery>,
) -> Result<Json<ItemInfo>, AppError> {
    downloader.info(&query.url).await.map(Json).map_err(|e| {
        warn!("Track info failed for {}: {}", query.url, e);
        AppError::bad_request(e.client_message())
    })
}

/// POST /download
pub async fn download(
    State(downloader): State<Arc<Downloader>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    if query.format != "mp3" {
        return Err(AppError::bad_request(
            DownloadError::UnsupportedFormat(query.format).client_message(),
        ));
    }

    let download = downloader
        .download(&query.url, &query.format, query.attach_metadata)
        .await
        .map_err(|e| {
            error!("Download failed for {}: {}", query.url, e);
            AppError::download_failed(&e)
        })?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let body = match download.body {
        DownloadBody::Buffered(bytes) => Body::from(bytes),
        DownloadBody::Stream(stream) => Body::from_stream(stream),
    };

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(download.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
