use crate::registry::ToolInterface;
use crate::types::{Message, ToolCall};
use async_trait::async_trait;
use std::sync::Arc;

/// One request to the model endpoint: the full ordered history plus the
/// derived tool-interface list.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Arc<ToolInterface>>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// The model's reply: final text and/or tool calls to dispatch.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The model boundary. Implement this for each LLM backend; the exact wire
/// format is the implementation's concern.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}
