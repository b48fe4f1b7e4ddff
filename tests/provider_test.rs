//! Tests for the HTTP chat provider against a wiremock endpoint.

use agentry::provider::{ChatProvider, ChatRequest, HttpProvider, ProviderError};
use agentry::registry::ToolInterface;
use agentry::types::Message;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(messages: Vec<Message>) -> ChatRequest {
    ChatRequest {
        model: "test-model".into(),
        messages,
        tools: Vec::new(),
        max_tokens: None,
        temperature: None,
    }
}

#[tokio::test]
async fn completes_a_plain_text_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Hello from the endpoint"}}]
        })))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri());
    let response = provider
        .complete(request(vec![Message::user("hello")]))
        .await
        .unwrap();

    assert_eq!(response.text, "Hello from the endpoint");
    assert!(!response.has_tool_calls());
}

#[tokio::test]
async fn parses_tool_calls_with_raw_argument_strings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call-9",
                    "type": "function",
                    "function": {"name": "add", "arguments": "{\"a\": 2, \"b\": 3}"}
                }]
            }}]
        })))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri());
    let response = provider
        .complete(request(vec![Message::user("2+3?")]))
        .await
        .unwrap();

    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call-9");
    assert_eq!(response.tool_calls[0].name, "add");
    assert_eq!(response.tool_calls[0].arguments, "{\"a\": 2, \"b\": 3}");
}

#[tokio::test]
async fn sends_tool_interfaces_and_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "add"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri()).with_api_key("secret-key");
    let mut req = request(vec![Message::user("go")]);
    req.tools = vec![Arc::new(ToolInterface {
        name: "add".into(),
        description: "Adds numbers".into(),
        parameters: json!({"type": "object", "properties": {}, "required": []}),
    })];

    provider.complete(req).await.unwrap();
}

#[tokio::test]
async fn auth_failures_are_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri());
    let err = provider
        .complete(request(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri());
    let err = provider
        .complete(request(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rate_limits_carry_the_retry_after_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri());
    let err = provider
        .complete(request(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    match err {
        ProviderError::RateLimited { retry_after_ms } => {
            assert_eq!(retry_after_ms, Some(2000));
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_endpoints_report_network_errors() {
    // Nothing listens on this port.
    let provider = HttpProvider::new("http://127.0.0.1:1");
    let err = provider
        .complete(request(vec![Message::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}
