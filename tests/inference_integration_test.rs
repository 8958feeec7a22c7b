// tests/inference_integration_test.rs
//! End-to-end inference through the public API with an in-process provider.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use chorus_lib::bus::event_types::{is_lifecycle_event, EVENT_FANOUT_COMPLETED};
use chorus_lib::bus::EventBus;
use chorus_lib::config::{EngineConfig, ServiceConfig};
use chorus_lib::model::{
    create_adapter, ChatMessage, GenerationSettings, ModelError, ProviderId, RequestEngine,
    StreamEvent,
};
use chorus_lib::runtime::{AgentStatus, FanOutOrchestrator, FanOutRequest, SessionState};
use common::mock_provider::BROKEN_MODEL;
use common::{MockProvider, MockTransport};

fn setup() -> (Arc<MockProvider>, Arc<MockTransport>, RequestEngine) {
    let provider = Arc::new(MockProvider::new());
    let transport = Arc::new(MockTransport::new(provider.clone()));
    let engine = RequestEngine::new(transport.clone(), EngineConfig::default());
    (provider, transport, engine)
}

fn service(name: &str, provider: &str, model: &str) -> ServiceConfig {
    ServiceConfig::new(name, provider, model)
        .with_api_key("test-key")
        .with_base_url("http://mock.local/v1")
}

fn conversation(prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are terse."),
        ChatMessage::user("Hi"),
        ChatMessage::assistant("Hello."),
        ChatMessage::user(prompt),
    ]
}

#[tokio::test]
async fn complete_and_stream_agree_across_dialects() {
    let (_provider, _transport, engine) = setup();
    let prompt = "what is a server sent event";
    let expected = MockProvider::answer_for(prompt);

    for (identity, model) in [("openai", "gpt-4o"), ("claude", "claude-sonnet-4-5")] {
        let adapter = create_adapter(identity).unwrap();
        let service = service(identity, identity, model);

        let complete = engine
            .complete(
                adapter.as_ref(),
                &service,
                &conversation(prompt),
                None,
                &GenerationSettings::default(),
            )
            .await
            .unwrap();
        assert_eq!(complete.text.as_deref(), Some(expected.as_str()), "{identity}");

        let stream = engine.stream(
            adapter,
            service,
            conversation(prompt),
            None,
            GenerationSettings::default(),
            Default::default(),
        );
        let events: Vec<StreamEvent> = StreamExt::collect(stream).await;
        assert_eq!(events.last(), Some(&StreamEvent::Completed), "{identity}");

        let streamed: String = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Delta(chunk) => chunk.text.clone(),
                _ => None,
            })
            .collect();
        assert!(events.len() > 2, "{identity} should stream several fragments");
        assert_eq!(streamed, expected, "{identity}");
    }
}

#[tokio::test]
async fn connection_failure_is_a_transport_error() {
    let (provider, transport, engine) = setup();
    transport
        .set_should_fail_connection(true, "dns lookup failed")
        .await;

    let result = engine
        .complete(
            create_adapter("openai").unwrap().as_ref(),
            &service("openai", "openai", "gpt-4o"),
            &conversation("hello"),
            None,
            &GenerationSettings::default(),
        )
        .await;

    assert_eq!(
        result.unwrap_err(),
        ModelError::Transport("dns lookup failed".to_string())
    );
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn unknown_provider_identity_is_rejected() {
    let error = create_adapter("not-a-provider").err().unwrap();
    assert!(matches!(error, ModelError::Configuration(_)));
    assert_eq!(create_adapter("lm-studio").unwrap().id(), ProviderId::LmStudio);
}

#[tokio::test]
async fn fan_out_reports_each_member_independently() {
    let (provider, _transport, engine) = setup();
    let bus = Arc::new(EventBus::new());
    let mut events = bus.subscribe();
    let orchestrator = FanOutOrchestrator::new(engine).with_bus(bus.clone());

    let session = orchestrator.start(FanOutRequest::new(
        vec![
            service("GPT", "openai", "gpt-4o"),
            service("Claude", "anthropic", "claude-sonnet-4-5"),
            service("Down", "groq", BROKEN_MODEL),
        ],
        conversation("compare notes"),
    ));
    session.wait().await;

    let members = session.members();
    let expected = MockProvider::answer_for("compare notes");
    assert_eq!(session.state(), SessionState::Complete);
    assert_eq!(members[0].text, expected);
    assert_eq!(members[0].status, AgentStatus::Complete);
    assert_eq!(members[1].text, expected);
    assert_eq!(members[1].status, AgentStatus::Complete);
    assert_eq!(members[2].status, AgentStatus::Failed);
    assert!(members[2]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("503")));
    assert_eq!(provider.request_count(), 3);

    let mut lifecycle = Vec::new();
    while let Ok(event) = events.try_recv() {
        if is_lifecycle_event(&event) {
            lifecycle.push(event.event_type);
        }
    }
    assert_eq!(lifecycle.last().map(String::as_str), Some(EVENT_FANOUT_COMPLETED));
}
