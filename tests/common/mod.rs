//! Shared test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, header};
use quip_gateway::relay::{CommentarySettings, SpeechSettings, UpstreamSettings};
use quip_gateway::{ApiServer, ApiServerBuilder, CommentaryRelay, PersonaRegistry, SpeechRelay};
use secrecy::SecretString;

pub const FIREWORKS_KEY: &str = "test-fireworks-key";
pub const ELEVENLABS_KEY: &str = "test-elevenlabs-key";

/// Voice configured for the embedded `dobby` persona
pub const DOBBY_VOICE: &str = "52d3CDIZuiBA0XXTytxR";

/// Build a server whose relays point at test upstreams
///
/// `commentary_url` is the full chat-completion endpoint; `speech_url` is
/// the voice-synthesis API base.
pub fn build_test_server(commentary_url: &str, speech_url: &str, read_timeout: Duration) -> ApiServer {
    let personas = Arc::new(PersonaRegistry::embedded().expect("embedded personas"));
    let client = reqwest::Client::new();
    let upstream = UpstreamSettings {
        read_timeout,
        ..UpstreamSettings::default()
    };

    let commentary = CommentaryRelay::new(
        client.clone(),
        SecretString::from(FIREWORKS_KEY.to_string()),
        CommentarySettings {
            url: commentary_url.to_string(),
            ..CommentarySettings::default()
        },
        upstream.clone(),
        personas.clone(),
    )
    .expect("commentary relay");

    let speech = SpeechRelay::new(
        client,
        SecretString::from(ELEVENLABS_KEY.to_string()),
        SpeechSettings {
            base_url: speech_url.to_string(),
            ..SpeechSettings::default()
        },
        upstream,
        personas.clone(),
    )
    .expect("speech relay");

    ApiServerBuilder::new(personas, commentary, speech, 0).build()
}

/// Build a JSON POST request
pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Build a GET request
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Render content deltas as a chat-completion event stream ending in `[DONE]`
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let event = serde_json::json!({
            "choices": [{ "delta": { "content": fragment } }]
        });
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
