//! HTTP API server for the quip gateway

pub mod commentary;
pub mod health;
pub mod personas;
pub mod speech;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::error::Upstream;
use crate::persona::PersonaRegistry;
use crate::relay::{CommentaryRelay, SpeechRelay, http_client};
use crate::{Config, Error, Result};

/// Shared state for API handlers
#[derive(Debug)]
pub struct ApiState {
    pub personas: Arc<PersonaRegistry>,
    pub commentary: CommentaryRelay,
    pub speech: SpeechRelay,
}

/// Builder for the API server
pub struct ApiServerBuilder {
    personas: Arc<PersonaRegistry>,
    commentary: CommentaryRelay,
    speech: SpeechRelay,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServerBuilder {
    /// Create a builder from ready-made relays
    #[must_use]
    pub const fn new(
        personas: Arc<PersonaRegistry>,
        commentary: CommentaryRelay,
        speech: SpeechRelay,
        port: u16,
    ) -> Self {
        Self {
            personas,
            commentary,
            speech,
            port,
            static_dir: None,
        }
    }

    /// Wire both relays from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built or a key is empty
    pub fn from_config(config: &Config, personas: Arc<PersonaRegistry>) -> Result<Self> {
        let client = http_client(&config.upstream)?;

        let commentary = CommentaryRelay::new(
            client.clone(),
            SecretString::from(config.api_keys.fireworks.expose_secret().to_owned()),
            config.commentary.clone(),
            config.upstream.clone(),
            personas.clone(),
        )?;
        let speech = SpeechRelay::new(
            client,
            SecretString::from(config.api_keys.elevenlabs.expose_secret().to_owned()),
            config.speech.clone(),
            config.upstream.clone(),
            personas.clone(),
        )?;

        Ok(Self::new(personas, commentary, speech, config.api_server.port)
            .static_dir(config.api_server.static_dir.clone()))
    }

    /// Serve a pre-built web UI from this directory
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                personas: self.personas,
                commentary: self.commentary,
                speech: self.speech,
            }),
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub const fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let api = commentary::router(self.state.clone())
            .merge(speech::router(self.state.clone()))
            .merge(personas::router(self.state.clone()));

        let mut router = Router::new().nest("/api", api).merge(health::router());

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            personas = self.state.personas.len(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// API errors
///
/// Client mistakes carry their message back to the caller. Upstream
/// failures only ever expose a generic message; the detail stays in the
/// logs.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    UpstreamFailed(Upstream),
    Internal,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_client_error() {
            tracing::debug!(error = %err, "rejected request");
        } else {
            tracing::error!(
                error = %err,
                upstream_status = ?err.upstream_status(),
                "request failed"
            );
        }

        match err {
            Error::Validation(msg) => Self::BadRequest(msg),
            Error::PersonaNotFound(id) => Self::BadRequest(format!("unknown characterId: {id}")),
            Error::Upstream { service, .. } | Error::StreamInterrupted { service, .. } => {
                Self::UpstreamFailed(service)
            }
            Error::Config(_) | Error::Io(_) | Error::Http(_) => Self::Internal,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::UpstreamFailed(Upstream::Commentary) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_failed",
                "failed to generate commentary".to_string(),
            ),
            Self::UpstreamFailed(Upstream::Speech) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_failed",
                "failed to generate speech".to_string(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
            }),
        )
            .into_response()
    }
}
