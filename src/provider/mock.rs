//! Mock provider for testing. No real API calls.

use super::traits::*;
use crate::types::ToolCall;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted reply: text, tool calls, or an injected failure.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<MockToolCall>),
    /// Retryable transport failure, for exercising the retry path.
    NetworkError(String),
    /// Non-retryable endpoint failure.
    ApiError(String),
}

#[derive(Debug, Clone)]
pub struct MockToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl MockToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Mock model endpoint. Supply a sequence of replies; each `complete` call
/// consumes the next one. Records every request for assertions.
pub struct MockProvider {
    replies: Mutex<Vec<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MockProvider {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Provider that always returns the same text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Text(text.into())])
    }

    /// Sleep this long before each reply, to exercise overlap assertions.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                MockReply::Text("(no more mock replies)".into())
            } else {
                replies.remove(0)
            }
        };

        match reply {
            MockReply::Text(text) => Ok(ChatResponse::text(text)),
            MockReply::ToolCalls(calls) => {
                let tool_calls = calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, call)| {
                        ToolCall::new(
                            format!("mock-call-{}", i),
                            call.name,
                            call.arguments.to_string(),
                        )
                    })
                    .collect();
                Ok(ChatResponse {
                    text: String::new(),
                    tool_calls,
                })
            }
            MockReply::NetworkError(message) => Err(ProviderError::Network(message)),
            MockReply::ApiError(message) => Err(ProviderError::Api(message)),
        }
    }
}
