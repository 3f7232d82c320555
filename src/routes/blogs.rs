use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::middleware::RequestContext;
use crate::models::artifact::ErrorResponse;
use crate::models::blog::{BlogContent, BlogQuery, BlogView, PageQuery};
use crate::routes::artifacts::content_disposition;

/// GET /blogs?page=&q=: newest posts first, optionally filtered by a
/// substring of the title or tag.
pub async fn list_blogs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<BlogQuery>,
) -> Response {
    match state.content.list(&query).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, error = %e, "Failed to list blogs");
            unavailable()
        }
    }
}

/// GET /blogs/{id}?page=: a post with one page of its comments.
pub async fn get_blog(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(content_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Response {
    let blog = match load(&state, &ctx, content_id).await {
        Ok(blog) => blog,
        Err(response) => return response,
    };

    match state.content.comments(content_id, query.page).await {
        Ok(comments) => Json(BlogView { blog, comments }).into_response(),
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, content_id, error = %e, "Failed to load comments");
            unavailable()
        }
    }
}

/// GET /download/{id}: synchronous plain-text export.
pub async fn download_text(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(content_id): Path<i64>,
) -> Response {
    let blog = match load(&state, &ctx, content_id).await {
        Ok(blog) => blog,
        Err(response) => return response,
    };

    let filename = format!("{}.txt", blog.title);
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        blog.to_text(),
    )
        .into_response()
}

async fn load(
    state: &AppState,
    ctx: &RequestContext,
    content_id: i64,
) -> Result<BlogContent, Response> {
    match state.content.get_by_id(content_id).await {
        Ok(Some(blog)) => Ok(blog),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("blog {content_id} not found"))),
        )
            .into_response()),
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, content_id, error = %e, "Failed to load blog");
            Err(unavailable())
        }
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("content store unavailable")),
    )
        .into_response()
}
