//! The core agent loop: prompt → model call → tool execution → repeat.
//!
//! `AgentLoop` owns one conversation and drives the bounded
//! iterate/act/observe cycle. Tool failures never escape the loop — they
//! become tool-result content the model can react to. Only endpoint
//! unreachability ends a run without an answer; hitting the iteration
//! bound returns the best-effort last text, annotated as incomplete.

use crate::plugin::{HookEvent, HookRegistry};
use crate::provider::{ChatProvider, ChatRequest, ChatResponse, ProviderError};
use crate::registry::ToolRegistry;
use crate::retry::{self, RetryConfig};
use crate::types::Message;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Loop-fatal errors. Everything else is conversational content.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model endpoint unreachable after {attempts} attempt(s): {source}")]
    ModelUnreachable {
        attempts: usize,
        #[source]
        source: ProviderError,
    },
}

/// Result of one `run` call.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final answer text, with any thinking block removed.
    pub answer: String,
    /// Delimited reasoning segment, if the model emitted one. The stored
    /// history keeps the raw text; only the returned answer is split.
    pub thinking: Option<String>,
    /// Tool-dispatch cycles consumed.
    pub iterations: usize,
    /// True when the run stopped at the iteration bound with the model
    /// still requesting tools; `answer` is then best-effort.
    pub limit_hit: bool,
}

/// One conversation and the loop that drives it.
pub struct AgentLoop {
    history: Vec<Message>,
    model: String,
    provider: Arc<dyn ChatProvider>,
    registry: Arc<ToolRegistry>,
    hooks: Option<Arc<HookRegistry>>,
    max_iterations: usize,
    retry: RetryConfig,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn ChatProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            history: Vec::new(),
            model: String::new(),
            provider,
            registry,
            hooks: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            retry: RetryConfig::default(),
            max_tokens: None,
            temperature: None,
            cancel: CancellationToken::new(),
        }
    }

    // -- Builder-style setters --

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.set_system_prompt(prompt);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Wire plugin hooks into the loop's turn and tool-batch boundaries.
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    // -- State access --

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Session reset: drops every message, the leading system prompt
    /// included.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Insert or replace the single leading system message.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let msg = Message::system(prompt);
        match self.history.first() {
            Some(Message::System { .. }) => self.history[0] = msg,
            _ => self.history.insert(0, msg),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    // -- The loop --

    /// Run one user request to completion: zero or more tool-dispatch
    /// cycles followed by a final answer.
    pub async fn run(&mut self, user_input: impl Into<String>) -> Result<RunOutcome, AgentError> {
        self.history.push(Message::user(user_input));

        let mut iterations = 0usize;
        loop {
            self.fire(HookEvent::TurnStart, json!({ "iteration": iterations }));

            let response = self.request_with_retry().await?;

            if !response.has_tool_calls() {
                let raw = response.text;
                self.history.push(Message::assistant(raw.clone()));
                self.fire(HookEvent::TurnEnd, json!({ "iteration": iterations }));
                let (thinking, answer) = split_thinking(&raw);
                return Ok(RunOutcome {
                    answer,
                    thinking,
                    iterations,
                    limit_hit: false,
                });
            }

            let calls = response.tool_calls;
            debug!(count = calls.len(), "dispatching tool calls");
            self.history
                .push(Message::assistant_with_calls(response.text, calls.clone()));

            self.fire(
                HookEvent::ToolBatchStart,
                json!({ "calls": calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>() }),
            );
            let results = self.registry.execute_many(&calls, &self.cancel).await;
            for result in &results {
                self.history
                    .push(Message::tool_result(&result.id, result.content()));
            }
            self.fire(
                HookEvent::ToolBatchEnd,
                json!({ "errors": results.iter().filter(|r| r.is_error()).count() }),
            );

            self.fire(HookEvent::TurnEnd, json!({ "iteration": iterations }));

            iterations += 1;
            if iterations >= self.max_iterations {
                warn!(
                    max = self.max_iterations,
                    "iteration bound reached, stopping with partial result"
                );
                let raw = self.last_assistant_text();
                let (thinking, answer) = split_thinking(&raw);
                return Ok(RunOutcome {
                    answer,
                    thinking,
                    iterations,
                    limit_hit: true,
                });
            }
        }
    }

    /// Send the full history to the endpoint, retrying transient failures
    /// with the history unchanged (idempotent resend).
    async fn request_with_retry(&self) -> Result<ChatResponse, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.history.clone(),
            tools: self.registry.list_interfaces(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut attempt = 0usize;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                    retry::log_retry(attempt, self.retry.max_retries, &delay, &e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AgentError::ModelUnreachable {
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }

    fn last_assistant_text(&self) -> String {
        self.history
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Assistant { content, .. } if !content.is_empty() => {
                    Some(content.clone())
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    fn fire(&self, event: HookEvent, payload: serde_json::Value) {
        if let Some(hooks) = &self.hooks {
            hooks.fire(event, &payload);
        }
    }
}

/// Split a delimited `<thinking>` block off the front of a reply. Returns
/// `(thinking, answer)`; the raw text is left untouched in history.
pub fn split_thinking(raw: &str) -> (Option<String>, String) {
    let trimmed = raw.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<thinking>") {
        if let Some(end) = rest.find("</thinking>") {
            let thinking = rest[..end].trim().to_string();
            let answer = rest[end + "</thinking>".len()..].trim_start().to_string();
            return (Some(thinking), answer);
        }
    }
    (None, raw.to_string())
}
