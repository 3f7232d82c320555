use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::middleware::RequestContext;
use crate::models::artifact::{CheckResponse, ErrorResponse, StartResponse};
use crate::models::job::JobId;
use crate::services::coordinator::ArtifactError;

/// POST /artifacts/{content_id}/start: dispatch PDF generation for a post.
pub async fn start(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(content_id): Path<i64>,
) -> Response {
    match state.artifacts.start(content_id).await {
        Ok(job_id) => Json(StartResponse {
            status: "success".to_string(),
            task_id: job_id.to_string(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, content_id, error = %e, "Failed to dispatch artifact job");
            error_response(&e)
        }
    }
}

/// GET /artifacts/{content_id}/check/{job_id}: poll job status.
pub async fn check(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((content_id, job_id)): Path<(i64, JobId)>,
) -> Response {
    match state.artifacts.check(&job_id).await {
        Ok(status) => Json(CheckResponse { status }).into_response(),
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                content_id,
                job_id = %job_id,
                error = %e,
                "Failed to check artifact job"
            );
            error_response(&e)
        }
    }
}

/// GET /artifacts/{content_id}/download/{job_id}: claim the finished PDF.
///
/// An expired, already claimed, or never produced artifact sends the
/// browser back to the post.
pub async fn download(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((content_id, job_id)): Path<(i64, JobId)>,
) -> Response {
    match state.artifacts.retrieve(&job_id, content_id).await {
        Ok(artifact) => (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
                (header::CONTENT_DISPOSITION, content_disposition(&artifact.filename)),
            ],
            artifact.bytes,
        )
            .into_response(),
        Err(ArtifactError::NotFound) => {
            tracing::info!(
                request_id = %ctx.request_id,
                content_id,
                job_id = %job_id,
                "Artifact not available, redirecting"
            );
            Redirect::to(&format!("/blogs/{content_id}")).into_response()
        }
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                content_id,
                job_id = %job_id,
                error = %e,
                "Failed to retrieve artifact"
            );
            error_response(&e)
        }
    }
}

fn error_response(err: &ArtifactError) -> Response {
    let status = match err {
        ArtifactError::NotFound => StatusCode::NOT_FOUND,
        ArtifactError::BrokerUnavailable(_) | ArtifactError::Store(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name as an RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-'
            | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    let value = format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}");
    // Both parts are visible ASCII by construction.
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
