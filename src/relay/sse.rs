//! Line framing for the chat-completion event stream
//!
//! The upstream sends newline-delimited lines:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Network chunks carry no alignment with these lines, so bytes are buffered
//! until a full line is available. Decoding to UTF-8 happens per complete
//! line, never per chunk.

use axum::body::Bytes;
use serde::Deserialize;
use thiserror::Error;

use super::{ChunkDecoder, DEFAULT_MAX_LINE_BYTES, Progress};

/// An unterminated line outgrew the buffer limit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event line exceeds {limit} bytes ({pending} buffered without a newline)")]
pub struct LineTooLong {
    pub pending: usize,
    pub limit: usize,
}

/// Accumulates raw bytes and hands out complete lines
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty buffer with the default line limit
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE_BYTES)
    }

    /// Create an empty buffer holding at most `max_line` unterminated bytes
    #[must_use]
    pub const fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
        }
    }

    /// Append a chunk and return every line it completed
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped. A trailing partial
    /// line stays buffered until a later chunk completes it. Only the new
    /// chunk is scanned for terminators. Call [`Self::check_limit`] after
    /// each push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let offset = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let last_newline = offset + pos;
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Fail once the unterminated remainder exceeds the limit
    ///
    /// The buffered bytes are released on failure.
    ///
    /// # Errors
    ///
    /// Returns [`LineTooLong`] with the number of bytes that were buffered
    pub fn check_limit(&mut self) -> Result<(), LineTooLong> {
        if self.pending.len() <= self.max_line {
            return Ok(());
        }
        let pending = self.pending.len();
        self.pending = Vec::new();
        Err(LineTooLong {
            pending,
            limit: self.max_line,
        })
    }

    /// Take the unterminated remainder once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Meaning of one complete event line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    /// A non-empty content delta
    Content(String),
    /// End-of-stream marker
    Done,
    /// Keep-alive, comment, empty delta or unparseable payload
    Skip,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: Option<ChatDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interpret a single line of the event stream
///
/// Malformed JSON is logged and skipped; it never ends the stream.
#[must_use]
pub fn parse_line(line: &str) -> EventLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return EventLine::Skip;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == "[DONE]" {
        return EventLine::Done;
    }

    match serde_json::from_str::<ChatChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map_or(EventLine::Skip, EventLine::Content),
        Err(e) => {
            tracing::warn!(error = %e, line = %payload, "skipping unparseable event line");
            EventLine::Skip
        }
    }
}

/// Decodes upstream chunks into commentary fragments
///
/// Lines after `[DONE]` are never looked at.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    lines: LineBuffer,
}

impl SseDecoder {
    pub(crate) const fn new(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::with_limit(max_line),
        }
    }

    fn accept(line: &str, out: &mut Vec<String>) -> Progress {
        match parse_line(line) {
            EventLine::Content(text) => {
                out.push(text);
                Progress::Continue
            }
            EventLine::Done => {
                tracing::trace!("received end-of-stream marker");
                Progress::Done
            }
            EventLine::Skip => Progress::Continue,
        }
    }
}

impl ChunkDecoder for SseDecoder {
    type Item = String;

    fn decode(
        &mut self,
        chunk: Bytes,
        out: &mut Vec<String>,
    ) -> std::result::Result<Progress, String> {
        for line in self.lines.push(&chunk) {
            if Self::accept(&line, out) == Progress::Done {
                return Ok(Progress::Done);
            }
        }
        self.lines.check_limit().map_err(|e| e.to_string())?;
        Ok(Progress::Continue)
    }

    fn finish(&mut self, out: &mut Vec<String>) {
        if let Some(line) = self.lines.finish() {
            Self::accept(&line, out);
        }
        tracing::debug!("upstream closed without an end-of-stream marker");
    }
}
