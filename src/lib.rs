//! Quip Gateway - In-character commentary and speech for a web UI
//!
//! This library provides the core functionality for the Quip gateway:
//! - A fixed registry of personas (prompt prefix, voice, imagery)
//! - A commentary relay that turns a streaming chat completion into text
//!   fragments as they arrive
//! - A speech relay that forwards synthesized MP3 audio chunk by chunk
//! - An HTTP API exposing both relays to the browser
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Browser / CLI                       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Quip Gateway                        │
//! │   API  │  Personas  │  Commentary  │  Speech        │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │  Chat completion    │       │  Voice synthesis      │
//! │  (SSE)              │       │  (chunked MP3)        │
//! └─────────────────────┘       └───────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod persona;
pub mod relay;

pub use api::{ApiServer, ApiServerBuilder};
pub use config::Config;
pub use error::{Error, Result, Upstream};
pub use persona::{Imagery, Persona, PersonaRegistry};
pub use relay::{
    AudioStream, Commentary, CommentaryRelay, CommentaryRequest, FragmentStream, RelayStream,
    SpeechRelay, SpeechRequest, UpstreamSettings,
};
