//! Commentary endpoints: streamed text and one-shot JSON

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use futures::TryStreamExt;

use super::{ApiError, ApiState};
use crate::relay::{Commentary, CommentaryRequest};

/// Build commentary router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/speak", post(speak))
        .route("/commentary", post(commentary))
        .with_state(state)
}

/// Stream commentary as plain text
///
/// Fragments are written to the body as they arrive. If the upstream drops
/// after the response started, the body is aborted so the caller sees a
/// truncated transfer instead of a clean end.
async fn speak(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CommentaryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let stream = state.commentary.relay(&request).await?;

    let persona_id = request.character_id;
    let body = Body::from_stream(stream.inspect_err(move |e| {
        tracing::warn!(persona_id = %persona_id, error = %e, "aborting commentary response");
    }));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Generate commentary and return it whole
async fn commentary(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CommentaryRequest>, JsonRejection>,
) -> Result<Json<Commentary>, ApiError> {
    let Json(request) = payload?;
    let commentary = state.commentary.complete(&request).await?;
    Ok(Json(commentary))
}
