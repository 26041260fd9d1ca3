//! TOML configuration file loading
//!
//! Supports `~/.config/quip/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct QuipConfigFile {
    /// Directory of persona JSON files replacing the built-in set
    #[serde(default)]
    pub personas_dir: Option<String>,

    /// Chat-completion upstream
    #[serde(default)]
    pub commentary: CommentaryFileConfig,

    /// Voice-synthesis upstream
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Transport settings shared by both upstreams
    #[serde(default)]
    pub upstream: UpstreamFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Chat-completion configuration
#[derive(Debug, Default, Deserialize)]
pub struct CommentaryFileConfig {
    /// Endpoint URL
    pub url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Maximum output tokens
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Voice-synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// API base URL
    pub url: Option<String>,

    /// Model identifier (e.g. "eleven_multilingual_v2")
    pub model_id: Option<String>,

    /// Output encoding (e.g. "mp3_44100_128")
    pub output_format: Option<String>,
}

/// Upstream transport configuration
#[derive(Debug, Default, Deserialize)]
pub struct UpstreamFileConfig {
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub max_line_bytes: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub fireworks: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory of the pre-built web UI
    pub static_dir: Option<String>,
}

/// Load the config file, returning defaults when absent or unreadable
pub fn load_config_file() -> QuipConfigFile {
    let Some(path) = config_file_path() else {
        return QuipConfigFile::default();
    };

    if !path.exists() {
        return QuipConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                QuipConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            QuipConfigFile::default()
        }
    }
}

/// Resolve the config file path
///
/// `QUIP_CONFIG` wins; otherwise `~/.config/quip/config.toml` on Linux.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("QUIP_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("quip").join("config.toml"))
}
