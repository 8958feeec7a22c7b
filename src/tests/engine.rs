//! Engine behavior over real HTTP against mock provider servers.

use httpmock::Method::POST;
use httpmock::MockServer;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::config::{EngineConfig, ServiceConfig};
use crate::model::{
    adapter_for, ChatMessage, GenerationSettings, ModelError, ProviderId, RequestEngine,
};

fn engine() -> RequestEngine {
    RequestEngine::with_reqwest(EngineConfig::default()).unwrap()
}

fn service(provider: ProviderId, server: &MockServer) -> ServiceConfig {
    ServiceConfig::new("mock", provider.as_str(), "test-model")
        .with_api_key("test-key")
        .with_base_url(server.base_url())
}

fn endpoint(provider: ProviderId) -> &'static str {
    match provider.adapter_family() {
        ProviderId::Anthropic => "/messages",
        ProviderId::Ollama => "/api/chat",
        _ => "/chat/completions",
    }
}

/// Non-streaming success body saying "Hello" in the provider's dialect.
fn completion_body(provider: ProviderId) -> serde_json::Value {
    match provider.adapter_family() {
        ProviderId::Anthropic => json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": "Hello" }],
            "stop_reason": "end_turn"
        }),
        ProviderId::Ollama => json!({
            "model": "test-model",
            "message": { "role": "assistant", "content": "Hello" },
            "done": true
        }),
        _ => json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello" },
                "finish_reason": "stop"
            }]
        }),
    }
}

/// Streaming body saying "Hello", then its terminator, then an event that must be ignored.
fn stream_body(provider: ProviderId) -> String {
    match provider.adapter_family() {
        ProviderId::Anthropic => [
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: ping\ndata: {\"type\":\"ping\"}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" ignored\"}}\n\n",
        ]
        .concat(),
        ProviderId::Ollama => [
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\" ignored\"},\"done\":false}\n",
        ]
        .concat(),
        _ => [
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" ignored\"}}]}\n\n",
        ]
        .concat(),
    }
}

#[tokio::test]
async fn status_codes_map_to_errors_for_every_provider() {
    let engine = engine();
    let messages = [ChatMessage::user("Say hello")];

    for provider in ProviderId::all() {
        let adapter = adapter_for(*provider);
        for status in [200u16, 401, 429, 404, 500] {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST).path(endpoint(*provider));
                    if status == 200 {
                        then.status(200).json_body(completion_body(*provider));
                    } else {
                        then.status(status).body("upstream says no");
                    }
                })
                .await;

            let result = engine
                .complete(
                    adapter.as_ref(),
                    &service(*provider, &server),
                    &messages,
                    None,
                    &GenerationSettings::default(),
                )
                .await;

            mock.assert_async().await;
            match status {
                200 => assert_eq!(
                    result.unwrap().text.as_deref(),
                    Some("Hello"),
                    "{provider} success"
                ),
                401 => assert_eq!(result.unwrap_err(), ModelError::Unauthorized, "{provider} 401"),
                429 => assert_eq!(result.unwrap_err(), ModelError::RateLimited, "{provider} 429"),
                _ => assert_eq!(
                    result.unwrap_err(),
                    ModelError::Server {
                        status,
                        body: "upstream says no".to_string()
                    },
                    "{provider} {status}"
                ),
            }
        }
    }
}

#[tokio::test]
async fn streaming_matches_non_streaming_and_stops_at_terminator() {
    let engine = engine();
    let messages = vec![ChatMessage::user("Say hello")];

    for provider in ProviderId::all() {
        let adapter = adapter_for(*provider);
        let server = MockServer::start_async().await;
        let streaming = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(endpoint(*provider))
                    .body_contains("\"stream\":true");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(stream_body(*provider));
            })
            .await;
        let whole = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(endpoint(*provider))
                    .body_contains("\"stream\":false");
                then.status(200).json_body(completion_body(*provider));
            })
            .await;
        let service = service(*provider, &server);

        let complete = engine
            .complete(
                adapter.as_ref(),
                &service,
                &messages,
                None,
                &GenerationSettings::default(),
            )
            .await
            .unwrap();
        let collected = engine
            .stream(
                adapter.clone(),
                service,
                messages.clone(),
                None,
                GenerationSettings::default(),
                Default::default(),
            )
            .collect()
            .await
            .unwrap();

        streaming.assert_async().await;
        whole.assert_async().await;
        assert!(!collected.cancelled, "{provider}");
        assert_eq!(collected.response.text.as_deref(), Some("Hello"), "{provider} stream");
        assert_eq!(collected.response.text, complete.text, "{provider} round trip");
    }
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("<html>gateway</html>");
        })
        .await;

    let result = engine()
        .complete(
            adapter_for(ProviderId::OpenAi).as_ref(),
            &service(ProviderId::OpenAi, &server),
            &[ChatMessage::user("hi")],
            None,
            &GenerationSettings::default(),
        )
        .await;

    assert!(matches!(result, Err(ModelError::Decode(_))), "{result:?}");
}

#[tokio::test]
async fn models_are_listed_through_the_adapter() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/models")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .json_body(json!({ "object": "list", "data": [{ "id": "gpt-4o" }, { "id": "o3-mini" }] }));
        })
        .await;

    let models = engine()
        .list_models(
            adapter_for(ProviderId::OpenAi).as_ref(),
            &service(ProviderId::OpenAi, &server),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    let ids: Vec<&str> = models.iter().map(|model| model.as_str()).collect();
    assert_eq!(ids, vec!["gpt-4o", "o3-mini"]);
}
