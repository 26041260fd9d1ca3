//! Speech relay: streaming voice synthesis for finished commentary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use reqwest::header;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{AudioStream, Passthrough, UpstreamSettings, send_upstream, spawn_pump};
use crate::error::Upstream;
use crate::persona::PersonaRegistry;
use crate::{Error, Result};

/// Default voice-synthesis API base
pub const DEFAULT_SPEECH_URL: &str = "https://api.elevenlabs.io";

/// Default synthesis model
pub const DEFAULT_SPEECH_MODEL: &str = "eleven_multilingual_v2";

/// MP3 at 44.1kHz, 128kbps
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";

/// MIME type of the synthesized audio
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Voice-synthesis request settings
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// API base URL
    pub base_url: String,
    /// Synthesis model identifier
    pub model_id: String,
    /// Output audio encoding
    pub output_format: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SPEECH_URL.to_string(),
            model_id: DEFAULT_SPEECH_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

/// Caller request for speech
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    /// Text to speak
    #[serde(default)]
    pub text: String,
    /// Persona whose voice to use
    #[serde(default)]
    pub character_id: String,
}

impl SpeechRequest {
    #[must_use]
    pub fn new(text: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            character_id: character_id.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    output_format: &'a str,
}

/// Relays synthesized audio to the caller
pub struct SpeechRelay {
    client: reqwest::Client,
    api_key: SecretString,
    settings: SpeechSettings,
    upstream: UpstreamSettings,
    personas: Arc<PersonaRegistry>,
}

impl std::fmt::Debug for SpeechRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechRelay")
            .field("settings", &self.settings)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl SpeechRelay {
    /// Create a speech relay
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        settings: SpeechSettings,
        upstream: UpstreamSettings,
        personas: Arc<PersonaRegistry>,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(
                "voice-synthesis API key required for speech".to_string(),
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

    /// Start streaming synthesized audio, one upstream chunk at a time
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] or [`Error::PersonaNotFound`] for bad
    /// input, and [`Error::Upstream`] if the upstream call fails
    pub async fn stream(&self, request: &SpeechRequest) -> Result<AudioStream> {
        if request.text.trim().is_empty() {
            return Err(Error::Validation("text is required".to_string()));
        }
        if request.character_id.trim().is_empty() {
            return Err(Error::Validation("characterId is required".to_string()));
        }
        let persona = self.personas.resolve(&request.character_id)?;

        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.settings.base_url.trim_end_matches('/'),
            persona.voice_id,
            self.settings.output_format
        );

        let body = SynthesisRequest {
            text: &request.text,
            model_id: &self.settings.model_id,
            output_format: &self.settings.output_format,
        };

        tracing::debug!(
            persona_id = %persona.id,
            voice_id = %persona.voice_id,
            model_id = %self.settings.model_id,
            text_len = request.text.len(),
            "requesting speech"
        );

        let builder = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header(header::ACCEPT, AUDIO_MIME)
            .json(&body);

        let response = send_upstream(Upstream::Speech, builder, self.upstream.read_timeout).await?;

        Ok(spawn_pump(
            Upstream::Speech,
            response,
            Passthrough,
            &self.upstream,
        ))
    }

    /// Synthesize the whole clip and return it as a `data:` URL
    ///
    /// A stream that drops part way is an error; the partial audio is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::stream`], or
    /// [`Error::StreamInterrupted`] if the upstream dropped mid-clip
    pub async fn data_url(&self, request: &SpeechRequest) -> Result<String> {
        let stream = self.stream(request).await?;
        let audio = collect_audio(stream).await?;

        tracing::debug!(bytes = audio.len(), "buffered speech clip");
        Ok(encode_data_url(&audio))
    }
}

/// Drain an audio stream into one buffer
///
/// # Errors
///
/// Returns the stream's interruption error, discarding the partial buffer
pub async fn collect_audio(mut stream: AudioStream) -> Result<Vec<u8>> {
    let mut audio = Vec::new();
    while let Some(chunk) = stream.next().await {
        audio.extend_from_slice(&chunk?);
    }
    Ok(audio)
}

/// Write an audio stream to `out`, returning the number of bytes written
///
/// Chunks go to a sibling `.part` file that is renamed into place once the
/// stream ends cleanly. On any failure the partial file is removed and `out`
/// is left untouched.
///
/// # Errors
///
/// Returns the stream's interruption error or any IO error
pub async fn save_audio(stream: AudioStream, out: &Path) -> Result<usize> {
    let partial = partial_path(out);

    match write_audio(stream, &partial).await {
        Ok(written) => {
            tokio::fs::rename(&partial, out).await?;
            tracing::debug!(path = %out.display(), bytes = written, "saved speech clip");
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&partial).await {
                tracing::warn!(path = %partial.display(), error = %rm, "failed to remove partial audio");
            }
            Err(e)
        }
    }
}

async fn write_audio(mut stream: AudioStream, path: &Path) -> Result<usize> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".part");
    out.with_file_name(name)
}

/// Encode MP3 bytes as a base64 `data:` URL
#[must_use]
pub fn encode_data_url(audio: &[u8]) -> String {
    format!(
        "data:{AUDIO_MIME};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(audio)
    )
}
