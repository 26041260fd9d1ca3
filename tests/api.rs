//! API endpoint integration tests against mocked upstreams

use std::time::Duration;

use axum::http::{StatusCode, header};
use base64::Engine as _;
use quip_gateway::PersonaRegistry;
use serde_json::json;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header as header_eq, method, path, query_param},
};

mod common;
use common::{
    DOBBY_VOICE, ELEVENLABS_KEY, FIREWORKS_KEY, build_test_server, get, post_json, sse_body,
};

const CHAT_PATH: &str = "/v1/chat/completions";

fn router_for(mock: &MockServer) -> axum::Router {
    build_test_server(
        &format!("{}{CHAT_PATH}", mock.uri()),
        &mock.uri(),
        Duration::from_secs(5),
    )
    .router()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Commentary
// =============================================================================

#[tokio::test]
async fn test_speak_streams_commentary_text() {
    let mock = MockServer::start().await;
    let registry = PersonaRegistry::embedded().unwrap();
    let expected_message = registry.lookup("dobby").unwrap().user_message("nice weather");

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header_eq("authorization", format!("Bearer {FIREWORKS_KEY}").as_str()))
        .and(body_partial_json(json!({
            "stream": true,
            "max_tokens": 16384,
            "messages": [{ "role": "user", "content": expected_message }]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hello", " there"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/speak",
            &json!({ "input": "nice weather", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_bytes(response).await, b"Hello there");
}

#[tokio::test]
async fn test_speak_without_done_marker_ends_cleanly() {
    let mock = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Kreacher\"}}]}\n",
        ": keep-alive\n",
        "data: {\"choices\":[{\"delta\":{}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" sulks\"}}]}",
    );
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/speak",
            &json!({ "input": "hello", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"Kreacher sulks");
}

#[tokio::test]
async fn test_speak_upstream_rejection_is_server_error() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key sk-secret"))
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/speak",
            &json!({ "input": "nice weather", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "upstream_failed");
    assert!(!json["error"]["message"].as_str().unwrap().contains("sk-secret"));
}

#[tokio::test]
async fn test_speak_unknown_persona_never_reaches_upstream() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/speak",
            &json!({ "input": "hi", "characterId": "voldemort" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "bad_request");
    assert!(json["error"]["message"].as_str().unwrap().contains("voldemort"));
}

#[tokio::test]
async fn test_speak_rejects_missing_fields() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let router = router_for(&mock);

    for body in [
        json!({ "input": "", "characterId": "dobby" }),
        json!({ "input": "   ", "characterId": "dobby" }),
        json!({ "characterId": "dobby" }),
        json!({ "input": "hi" }),
    ] {
        let response = router
            .clone()
            .oneshot(post_json("/api/speak", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn test_speak_rejects_malformed_json() {
    let mock = MockServer::start().await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/speak")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let response = router_for(&mock).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_commentary_returns_full_text() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Master ", "has ", "given ", "sock"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/commentary",
            &json!({ "input": "a sock", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["commentary"], "Master has given sock");
    assert!(json["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_commentary_empty_completion_is_server_error() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n", "text/event-stream"))
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/commentary",
            &json!({ "input": "anything", "characterId": "lebrown" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Speech
// =============================================================================

fn synthesis_path(voice: &str) -> String {
    format!("/v1/text-to-speech/{voice}/stream")
}

#[tokio::test]
async fn test_tts_streams_audio() {
    let mock = MockServer::start().await;
    let audio: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    Mock::given(method("POST"))
        .and(path(synthesis_path(DOBBY_VOICE)))
        .and(query_param("output_format", "mp3_44100_128"))
        .and(header_eq("xi-api-key", ELEVENLABS_KEY))
        .and(body_partial_json(json!({
            "text": "Dobby is free",
            "model_id": "eleven_multilingual_v2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(audio.clone(), "audio/mpeg"))
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/tts",
            &json!({ "text": "Dobby is free", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(body_bytes(response).await, audio);
}

#[tokio::test]
async fn test_text_to_speech_returns_data_url() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(synthesis_path(DOBBY_VOICE)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"ABC".to_vec(), "audio/mpeg"))
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/text-to-speech",
            &json!({ "text": "Dobby is free", "characterId": "dobby" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let url = json["audioUrl"].as_str().unwrap();
    assert_eq!(url, "data:audio/mpeg;base64,QUJD");

    let payload = url.strip_prefix("data:audio/mpeg;base64,").unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    assert_eq!(decoded, b"ABC");
}

#[tokio::test]
async fn test_tts_uses_persona_voice() {
    let mock = MockServer::start().await;
    let registry = PersonaRegistry::embedded().unwrap();
    let lebrown_voice = registry.lookup("lebrown").unwrap().voice_id.clone();

    Mock::given(method("POST"))
        .and(path(synthesis_path(&lebrown_voice)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"mp3".to_vec(), "audio/mpeg"))
        .expect(1)
        .mount(&mock)
        .await;

    let response = router_for(&mock)
        .oneshot(post_json(
            "/api/tts",
            &json!({ "text": "taco tuesday", "characterId": "lebrown" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"mp3");
}

#[tokio::test]
async fn test_tts_upstream_failure_is_server_error() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .expect(2)
        .mount(&mock)
        .await;

    let router = router_for(&mock);
    for uri in ["/api/tts", "/api/text-to-speech"] {
        let response = router
            .clone()
            .oneshot(post_json(uri, &json!({ "text": "hi", "characterId": "dobby" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "failed to generate speech");
    }
}

#[tokio::test]
async fn test_tts_rejects_bad_input_before_upstream() {
    let mock = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let router = router_for(&mock);
    for body in [
        json!({ "text": "", "characterId": "dobby" }),
        json!({ "text": "hi", "characterId": "nobody" }),
        json!({ "text": "hi" }),
    ] {
        let response = router
            .clone()
            .oneshot(post_json("/api/tts", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

// =============================================================================
// Personas and health
// =============================================================================

#[tokio::test]
async fn test_list_personas() {
    let mock = MockServer::start().await;

    let response = router_for(&mock).oneshot(get("/api/personas")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 2);

    let personas = json["personas"].as_array().unwrap();
    let ids: Vec<&str> = personas.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["dobby", "lebrown"]);
    assert_eq!(personas[0]["voiceId"], DOBBY_VOICE);
    assert!(personas[0]["imagery"].is_object());
    assert!(personas[0].get("prompt").is_none());
}

#[tokio::test]
async fn test_get_persona() {
    let mock = MockServer::start().await;
    let router = router_for(&mock);

    let response = router.clone().oneshot(get("/api/personas/lebrown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], "lebrown");

    let response = router.oneshot(get("/api/personas/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_health_endpoint() {
    let mock = MockServer::start().await;

    let response = router_for(&mock).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}
