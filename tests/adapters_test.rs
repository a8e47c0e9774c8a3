//! HTTP adapters against mock servers.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard::providers::{OllamaAdapter, OpenAiCompatibleAdapter, ProviderAdapter};
use switchboard::types::{
    FinishReason, GenerateEvent, GenerateOptions, GenerateRequest, Message, Usage,
};
use switchboard::{ProviderOptions, RouteRequest, Switchboard, SwitchboardError};

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        messages: vec![Message::user(prompt)],
        tools: Vec::new(),
        options: GenerateOptions::new().max_tokens(64),
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "model": "llama-3.3-70b",
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3}
    })
}

async fn collect(mut stream: switchboard::providers::EventStream) -> Vec<GenerateEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    events
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

#[tokio::test]
async fn openai_generate_parses_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b",
            "stream": false,
            "max_tokens": 64
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hi there")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new(
        "groq",
        format!("{}/v1", server.uri()),
        "llama-3.3-70b",
    )
    .unwrap()
    .api_key("sk-test");

    let response = adapter.generate(&request("hello")).await.unwrap();

    assert_eq!(response.content, "hi there");
    assert_eq!(response.model, "llama-3.3-70b");
    assert_eq!(response.usage, Some(Usage::new(12, 3)));
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn openai_bad_key_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("groq", server.uri(), "m").unwrap();
    let err = adapter.generate(&request("hello")).await.unwrap_err();

    assert!(matches!(err, SwitchboardError::AuthenticationFailed));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn openai_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("groq", server.uri(), "m").unwrap();
    let err = adapter.generate(&request("hello")).await.unwrap_err();

    match err {
        SwitchboardError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn openai_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("groq", server.uri(), "m").unwrap();
    let err = adapter.generate(&request("hello")).await.unwrap_err();

    assert!(matches!(err, SwitchboardError::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn openai_empty_choices_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("groq", server.uri(), "m").unwrap();
    let err = adapter.generate(&request("hello")).await.unwrap_err();
    assert!(matches!(err, SwitchboardError::EmptyResponse));
}

#[tokio::test]
async fn openai_stream_yields_text_usage_and_done() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("groq", server.uri(), "m").unwrap();
    let events = collect(adapter.generate_stream(&request("hello")).await.unwrap()).await;

    assert_eq!(
        events,
        vec![
            GenerateEvent::Text("Hel".into()),
            GenerateEvent::Text("lo".into()),
            GenerateEvent::Usage(Usage::new(4, 2)),
            GenerateEvent::Done,
        ]
    );
}

// ============================================================================
// Ollama
// ============================================================================

#[tokio::test]
async fn ollama_generate_parses_chat_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.2", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "local answer"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 9,
            "eval_count": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new("ollama", server.uri(), "llama3.2").unwrap();
    let response = adapter.generate(&request("hello")).await.unwrap();

    assert_eq!(response.content, "local answer");
    assert_eq!(response.usage, Some(Usage::new(9, 2)));
    assert!(adapter.metadata().deployment.is_local());
}

#[tokio::test]
async fn ollama_stream_reads_ndjson() {
    let server = MockServer::start().await;
    let ndjson = concat!(
        "{\"message\":{\"content\":\"one \"},\"done\":false}\n",
        "{\"message\":{\"content\":\"two\"},\"done\":false}\n",
        "{\"message\":{\"content\":\"\"},\"done\":true,\"prompt_eval_count\":3,\"eval_count\":2}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new("ollama", server.uri(), "llama3.2").unwrap();
    let events = collect(adapter.generate_stream(&request("hello")).await.unwrap()).await;

    assert_eq!(
        events,
        vec![
            GenerateEvent::Text("one ".into()),
            GenerateEvent::Text("two".into()),
            GenerateEvent::Usage(Usage::new(3, 2)),
            GenerateEvent::Done,
        ]
    );
}

#[tokio::test]
async fn ollama_missing_model_is_model_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new("ollama", server.uri(), "nope").unwrap();
    let err = adapter.generate(&request("hello")).await.unwrap_err();
    assert!(matches!(err, SwitchboardError::ModelNotFound(ref m) if m == "nope"));
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn gateway_falls_back_across_real_http_providers() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&down)
        .await;
    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from backup")))
        .expect(1)
        .mount(&up)
        .await;

    let board = Switchboard::builder()
        .provider(
            OpenAiCompatibleAdapter::new("primary", down.uri(), "m").unwrap(),
            ProviderOptions::new().priority(1),
        )
        .provider(
            OpenAiCompatibleAdapter::new("backup", up.uri(), "m").unwrap(),
            ProviderOptions::new().priority(2),
        )
        .build()
        .unwrap();

    let routed = board.generate(&RouteRequest::prompt("hello")).await.unwrap();

    assert_eq!(routed.content(), "from backup");
    assert_eq!(routed.provenance.fallback_path, vec!["primary", "backup"]);
    assert_eq!(routed.provenance.usage, Some(Usage::new(12, 3)));
}
