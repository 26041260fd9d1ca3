//! Error types for the quip gateway

use std::fmt;

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Third-party service a relay talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// Chat-completion endpoint
    Commentary,
    /// Voice-synthesis endpoint
    Speech,
}

impl Upstream {
    /// Short identifier used in logs and error codes
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commentary => "commentary",
            Self::Speech => "speech",
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the quip gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Request failed validation before any upstream work
    #[error("invalid request: {0}")]
    Validation(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Upstream call failed before any output was produced
    #[error("{service} upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        service: Upstream,
        status: Option<u16>,
        message: String,
    },

    /// Upstream connection dropped after streaming began
    #[error("{service} stream interrupted: {message}")]
    StreamInterrupted { service: Upstream, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    /// Whether the error was caused by the caller's input
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::PersonaNotFound(_))
    }

    /// Upstream HTTP status carried by the error, if any
    #[must_use]
    pub const fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_display_includes_status() {
        let err = Error::Upstream {
            service: Upstream::Commentary,
            status: Some(401),
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "commentary upstream error (401): unauthorized");
        assert_eq!(err.upstream_status(), Some(401));
    }

    #[test]
    fn upstream_error_display_without_status() {
        let err = Error::Upstream {
            service: Upstream::Speech,
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "speech upstream error: connection refused");
        assert!(!err.is_client_error());
    }

    #[test]
    fn validation_errors_are_client_errors() {
        assert!(Error::Validation("empty".into()).is_client_error());
        assert!(Error::PersonaNotFound("nobody".into()).is_client_error());
        assert!(
            !Error::StreamInterrupted {
                service: Upstream::Speech,
                message: "eof".into(),
            }
            .is_client_error()
        );
    }
}
