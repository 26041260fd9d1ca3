//! Commentary relay: streaming chat completion in a persona's voice

use std::sync::Arc;

use reqwest::header;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::sse::SseDecoder;
use super::{FragmentStream, UpstreamSettings, send_upstream, spawn_pump};
use crate::error::Upstream;
use crate::persona::PersonaRegistry;
use crate::{Error, Result};

/// Default chat-completion endpoint
pub const DEFAULT_COMMENTARY_URL: &str = "https://api.fireworks.ai/inference/v1/chat/completions";

/// Default chat model
pub const DEFAULT_COMMENTARY_MODEL: &str =
    "accounts/sentientfoundation/models/dobby-mini-unhinged-llama-3-1-8b";

/// Chat-completion request settings
#[derive(Debug, Clone)]
pub struct CommentarySettings {
    /// Chat-completion endpoint URL
    pub url: String,
    /// Model identifier
    pub model: String,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for CommentarySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_COMMENTARY_URL.to_string(),
            model: DEFAULT_COMMENTARY_MODEL.to_string(),
            max_tokens: 16_384,
            temperature: 0.7,
        }
    }
}

/// Caller request for commentary
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryRequest {
    /// Text to react to
    #[serde(default)]
    pub input: String,
    /// Persona to speak as
    #[serde(default)]
    pub character_id: String,
}

impl CommentaryRequest {
    #[must_use]
    pub fn new(input: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            character_id: character_id.into(),
        }
    }
}

/// Fully collected commentary
#[derive(Debug, Clone, Serialize)]
pub struct Commentary {
    pub commentary: String,
    /// Completion time in Unix milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    messages: [ChatMessage; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Relays streaming chat completions to the caller
pub struct CommentaryRelay {
    client: reqwest::Client,
    api_key: SecretString,
    settings: CommentarySettings,
    upstream: UpstreamSettings,
    personas: Arc<PersonaRegistry>,
}

impl std::fmt::Debug for CommentaryRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentaryRelay")
            .field("settings", &self.settings)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl CommentaryRelay {
    /// Create a commentary relay
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        settings: CommentarySettings,
        upstream: UpstreamSettings,
        personas: Arc<PersonaRegistry>,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(
                "chat-completion API key required for commentary".to_string(),
            ));
        }

        Ok(Self {
            client,
            api_key,
            settings,
            upstream,
            personas,
        })
    }

    /// Start streaming commentary
    ///
    /// Validation happens before any network call. Once this returns `Ok`,
    /// the upstream accepted the request and fragments arrive through the
    /// returned stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] or [`Error::PersonaNotFound`] for bad
    /// input, and [`Error::Upstream`] if the upstream call fails
    pub async fn relay(&self, request: &CommentaryRequest) -> Result<FragmentStream> {
        if request.input.trim().is_empty() {
            return Err(Error::Validation("input text is required".to_string()));
        }
        if request.character_id.trim().is_empty() {
            return Err(Error::Validation("characterId is required".to_string()));
        }
        let persona = self.personas.resolve(&request.character_id)?;

        let body = ChatRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: true,
            messages: [ChatMessage {
                role: "user",
                content: persona.user_message(&request.input),
            }],
        };

        tracing::debug!(
            persona_id = %persona.id,
            model = %self.settings.model,
            input_len = request.input.len(),
            "requesting commentary"
        );

        let builder = self
            .client
            .post(&self.settings.url)
            .bearer_auth(self.api_key.expose_secret())
            .header(header::ACCEPT, "application/json")
            .json(&body);

        let response =
            send_upstream(Upstream::Commentary, builder, self.upstream.read_timeout).await?;

        Ok(spawn_pump(
            Upstream::Commentary,
            response,
            SseDecoder::new(self.upstream.max_line_bytes),
            &self.upstream,
        ))
    }

    /// Generate commentary and wait for all of it
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::relay`], [`Error::StreamInterrupted`]
    /// if the stream dropped, or [`Error::Upstream`] if the model produced no
    /// text
    pub async fn complete(&self, request: &CommentaryRequest) -> Result<Commentary> {
        let mut stream = self.relay(request).await?;

        let mut commentary = String::new();
        while let Some(fragment) = stream.next().await {
            commentary.push_str(&fragment?);
        }

        if commentary.is_empty() {
            tracing::warn!(persona_id = %request.character_id, "upstream produced no commentary");
            return Err(Error::Upstream {
                service: Upstream::Commentary,
                status: None,
                message: "empty completion".to_string(),
            });
        }

        Ok(Commentary {
            commentary,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}
