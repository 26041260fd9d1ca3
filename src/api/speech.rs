//! Speech endpoints: chunked audio and buffered `data:` URLs

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
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::relay::SpeechRequest;
use crate::relay::speech::AUDIO_MIME;

/// Build speech router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tts", post(tts))
        .route("/text-to-speech", post(text_to_speech))
        .with_state(state)
}

/// Buffered synthesis response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUrlResponse {
    pub audio_url: String,
}

/// Stream MP3 audio as the upstream produces it
async fn tts(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let stream = state.speech.stream(&request).await?;

    let body = Body::from_stream(stream.inspect_err(|e| {
        tracing::warn!(error = %e, "aborting audio response");
    }));

    Ok((
        [
            (header::CONTENT_TYPE, AUDIO_MIME),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Synthesize the whole clip and return it as a `data:` URL
async fn text_to_speech(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<AudioUrlResponse>, ApiError> {
    let Json(request) = payload?;
    let audio_url = state.speech.data_url(&request).await?;
    Ok(Json(AudioUrlResponse { audio_url }))
}
