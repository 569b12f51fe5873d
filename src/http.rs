//! HTTP binding of the redaction service (axum).
//!
//! | Method | Path                              | Purpose                          |
//! |--------|-----------------------------------|----------------------------------|
//! | GET    | `/api/ping`                       | liveness                         |
//! | POST   | `/api/redact/analyze`             | multipart upload → analyze JSON  |
//! | POST   | `/api/redact/confirm`             | confirm JSON → `.tar.gz` archive |
//! | GET    | `{image_route_prefix}/:id/:index` | stored page PNG                  |
//!
//! Authentication is not handled here; mount the router behind whatever
//! gate protects the rest of the application.

use crate::error::{DocumentFailure, RedactError};
use crate::model::{AnalyzeOutput, ConfirmRequest};
use crate::pipeline::archive::{ARCHIVE_CONTENT_TYPE, ARCHIVE_FILENAME};
use crate::pipeline::input::Upload;
use crate::service::Redactor;
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Number of documents present in the returned archive.
pub const REDACTED_COUNT_HEADER: HeaderName = HeaderName::from_static("x-redacted-documents");

/// Number of documents dropped from the batch.
pub const FAILED_COUNT_HEADER: HeaderName = HeaderName::from_static("x-failed-documents");

/// Build the router for a shared [`Redactor`].
pub fn router(redactor: Arc<Redactor>) -> Router {
    let limit = redactor.config().max_upload_bytes;
    let page_route = format!(
        "{}/:id/:index",
        redactor.config().image_route_prefix.trim_end_matches('/')
    );

    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/redact/analyze", post(analyze))
        .route("/api/redact/confirm", post(confirm))
        .route(&page_route, get(page_image))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(redactor)
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Redact(#[from] RedactError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Not found")]
    NotFound,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Redact(e) => match e {
                RedactError::Input(_) => StatusCode::BAD_REQUEST,
                RedactError::ArchiveEmpty { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RedactError::WorkspaceNotFound { .. } => StatusCode::NOT_FOUND,
                RedactError::InvalidConfig(_)
                | RedactError::Archive(_)
                | RedactError::Storage(_)
                | RedactError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn failures(&self) -> &[DocumentFailure] {
        match self {
            ApiError::Redact(e) => e.failures(),
            _ => &[],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
            "failures": self.failures(),
        }));

        (status, body).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Every multipart field that carries a filename is one document; other
/// fields are ignored.
async fn analyze(
    State(redactor): State<Arc<Redactor>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeOutput>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!("Ignoring non-file field {:?}", field.name());
            continue;
        };
        let bytes = field.bytes().await?;
        uploads.push(Upload::new(filename, bytes.to_vec()));
    }

    Ok(Json(redactor.analyze(uploads).await?))
}

async fn confirm(
    State(redactor): State<Arc<Redactor>>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let output = redactor.confirm(request).await?;

    let headers = [
        (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{ARCHIVE_FILENAME}\""),
        ),
        (REDACTED_COUNT_HEADER, output.redacted_count().to_string()),
        (FAILED_COUNT_HEADER, output.failures.len().to_string()),
    ];
    Ok((StatusCode::OK, headers, output.archive).into_response())
}

async fn page_image(
    State(redactor): State<Arc<Redactor>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Response, ApiError> {
    let png = redactor
        .page_image(&id, index)
        .await
        .ok_or(ApiError::NotFound)?;

    let headers = [
        (header::CONTENT_TYPE, "image/png"),
        (header::CACHE_CONTROL, "no-store"),
    ];
    Ok((headers, png).into_response())
}
