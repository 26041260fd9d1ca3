//! Configuration management for the quip gateway
//!
//! Sources in priority order: environment, `config.toml`, built-in defaults.
//! Both upstream credentials are required; startup fails without them rather
//! than sending unauthenticated requests.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::relay::{CommentarySettings, SpeechSettings, UpstreamSettings};
use crate::{Error, Result};

use self::file::QuipConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 3000;

/// Subdirectory of the static dir for user uploads
const UPLOADS_DIR: &str = "uploads";

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Persona directory override (embedded personas when `None`)
    pub personas_dir: Option<PathBuf>,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Chat-completion upstream
    pub commentary: CommentarySettings,

    /// Voice-synthesis upstream
    pub speech: SpeechSettings,

    /// Transport settings for both upstreams
    pub upstream: UpstreamSettings,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

/// API keys for the upstream providers
#[derive(Debug)]
pub struct ApiKeys {
    /// Chat-completion key (`FIREWORKS_API_KEY`)
    pub fireworks: SecretString,

    /// Voice-synthesis key (`ELEVENLABS_API_KEY`)
    pub elevenlabs: SecretString,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a required API key is missing or a value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if a required API key is missing or a value is invalid
    pub fn from_sources<F>(env: F, fc: QuipConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // API keys (env > toml), both required
        let api_keys = ApiKeys {
            fireworks: required_key(
                env("FIREWORKS_API_KEY").or(fc.api_keys.fireworks),
                "FIREWORKS_API_KEY",
            )?,
            elevenlabs: required_key(
                env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
                "ELEVENLABS_API_KEY",
            )?,
        };

        // API server config (env > toml > default)
        let port = match env("QUIP_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid port {raw:?}: {e}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };
        let api_server = ApiServerConfig {
            port,
            static_dir: env("QUIP_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let personas_dir = env("QUIP_PERSONAS_DIR")
            .or(fc.personas_dir)
            .map(PathBuf::from);

        // Chat completion (env > toml > default)
        let commentary_default = CommentarySettings::default();
        let commentary = CommentarySettings {
            url: env("QUIP_COMMENTARY_URL")
                .or(fc.commentary.url)
                .unwrap_or(commentary_default.url),
            model: env("QUIP_COMMENTARY_MODEL")
                .or(fc.commentary.model)
                .unwrap_or(commentary_default.model),
            max_tokens: fc
                .commentary
                .max_tokens
                .unwrap_or(commentary_default.max_tokens),
            temperature: fc
                .commentary
                .temperature
                .unwrap_or(commentary_default.temperature),
        };
        if !(0.0..=2.0).contains(&commentary.temperature) {
            return Err(Error::Config(format!(
                "temperature must be between 0 and 2, got {}",
                commentary.temperature
            )));
        }

        // Voice synthesis (env > toml > default)
        let speech_default = SpeechSettings::default();
        let speech = SpeechSettings {
            base_url: env("QUIP_SPEECH_URL")
                .or(fc.speech.url)
                .unwrap_or(speech_default.base_url),
            model_id: env("QUIP_SPEECH_MODEL")
                .or(fc.speech.model_id)
                .unwrap_or(speech_default.model_id),
            output_format: fc
                .speech
                .output_format
                .unwrap_or(speech_default.output_format),
        };

        // Upstream transport (env > toml > default)
        let upstream_default = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            connect_timeout: secs(env("QUIP_CONNECT_TIMEOUT_SECS"), "QUIP_CONNECT_TIMEOUT_SECS")?
                .or(fc.upstream.connect_timeout_secs.map(Duration::from_secs))
                .unwrap_or(upstream_default.connect_timeout),
            read_timeout: secs(env("QUIP_READ_TIMEOUT_SECS"), "QUIP_READ_TIMEOUT_SECS")?
                .or(fc.upstream.read_timeout_secs.map(Duration::from_secs))
                .unwrap_or(upstream_default.read_timeout),
            channel_capacity: fc
                .upstream
                .channel_capacity
                .unwrap_or(upstream_default.channel_capacity),
            max_line_bytes: fc
                .upstream
                .max_line_bytes
                .unwrap_or(upstream_default.max_line_bytes),
        };
        if upstream.read_timeout.is_zero() {
            return Err(Error::Config("read timeout must be greater than zero".to_string()));
        }
        if upstream.max_line_bytes == 0 {
            return Err(Error::Config("max_line_bytes must be greater than zero".to_string()));
        }

        Ok(Self {
            personas_dir,
            api_keys,
            api_server,
            commentary,
            speech,
            upstream,
        })
    }

    /// Create the static directory and its uploads subdirectory if configured
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created
    pub fn ensure_static_dirs(&self) -> Result<()> {
        let Some(static_dir) = &self.api_server.static_dir else {
            return Ok(());
        };

        let uploads = static_dir.join(UPLOADS_DIR);
        if !uploads.exists() {
            std::fs::create_dir_all(&uploads)?;
            tracing::info!(path = %uploads.display(), "created static directories");
        }

        Ok(())
    }
}

fn required_key(value: Option<String>, name: &str) -> Result<SecretString> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| Error::Config(format!("{name} is not set")))
}

fn secs(value: Option<String>, name: &str) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            raw.parse()
                .map(Duration::from_secs)
                .map_err(|e| Error::Config(format!("invalid {name} {raw:?}: {e}")))
        })
        .transpose()
}
