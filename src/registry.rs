//! Tool registry and executor.
//!
//! Owns the set of registered tool contracts, derives the model-facing
//! interface list (cached per contract), validates arguments against each
//! contract's schema, and executes one or many calls with per-call error
//! isolation. A failing call never raises at the batch level — every
//! failure is captured in that call's result.

use crate::schema::{Schema, ValidationIssue};
use crate::types::ToolCall;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default per-call executor timeout.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// The tool contract
// ---------------------------------------------------------------------------

/// A tool the model may invoke. The registry validates arguments against
/// `schema()` before `execute` runs, so executors receive well-typed input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name within a registry.
    fn name(&self) -> &str;
    /// Description shown to the model.
    fn description(&self) -> &str;
    /// Parameter schema. Always an object at the top level.
    fn schema(&self) -> Schema;
    /// Execute with validated arguments.
    async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolFailure>;
}

/// Error raised by a tool executor. The registry wraps it as
/// [`ToolError::ExecutionFailed`] carrying the tool name.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ToolFailure(pub String);

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for ToolFailure {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Closure-backed tool contract, for tools that are a plain function.
pub struct FnTool {
    name: String,
    description: String,
    schema: Schema,
    #[allow(clippy::type_complexity)]
    executor: Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolFailure>> + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
        executor: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolFailure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            executor: Box::new(move |args| Box::pin(executor(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn schema(&self) -> Schema {
        self.schema.clone()
    }
    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolFailure> {
        (self.executor)(args).await
    }
}

// ---------------------------------------------------------------------------
// Errors & results
// ---------------------------------------------------------------------------

/// Per-call failure taxonomy. These never cross the agent-loop boundary as
/// errors — they become conversational content the model can react to.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),
    #[error("invalid arguments: {}", issues_summary(.0))]
    InvalidArguments(Vec<ValidationIssue>),
    #[error("tool '{tool}' failed: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("cancelled")]
    Cancelled,
}

fn issues_summary(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of one tool call. Carries the originating call's identity so a
/// batch can be re-paired with its requests in order.
#[derive(Debug)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub outcome: Result<Value, ToolError>,
}

impl ToolCallResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Render the outcome as tool-message content: the success payload as
    /// text, or `{"error": "..."}` so the model can self-correct.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(Value::String(s)) => s.clone(),
            Ok(v) => v.to_string(),
            Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
        }
    }
}

/// Derived model-facing description of one registered contract.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolInterface {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct Registered {
    tool: Arc<dyn Tool>,
    /// Lazily derived on first `list_interfaces` after (re)registration.
    /// Replacing the entry replaces the cell, which is what keeps the cache
    /// in lock-step with the currently registered schema.
    interface: OnceLock<Arc<ToolInterface>>,
}

/// Process-wide shared registry. Registration is expected at startup or
/// from a serialized plugin-load sequence; concurrent registration races
/// are out of scope.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Registered>>,
    call_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Register a contract, overwriting any previous tool with the same
    /// name and invalidating that name's cached interface.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let entry = Registered {
            tool,
            interface: OnceLock::new(),
        };
        self.tools.write().expect("registry lock").insert(name, entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().expect("registry lock").contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().expect("registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derived interface descriptions for every registered contract, in
    /// deterministic (name) order. Cached per contract: repeated calls
    /// return the same `Arc` until that name is re-registered.
    pub fn list_interfaces(&self) -> Vec<Arc<ToolInterface>> {
        let tools = self.tools.read().expect("registry lock");
        tools
            .values()
            .map(|entry| {
                entry
                    .interface
                    .get_or_init(|| {
                        Arc::new(ToolInterface {
                            name: entry.tool.name().to_string(),
                            description: entry.tool.description().to_string(),
                            parameters: entry.tool.schema().to_interface(),
                        })
                    })
                    .clone()
            })
            .collect()
    }

    /// Execute a single call: resolve, parse, validate, invoke. Every
    /// failure mode is captured in the returned result.
    pub async fn execute_one(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let outcome = self.dispatch(call, cancel).await;
        if let Err(e) = &outcome {
            warn!(tool = %call.name, id = %call.id, "tool call failed: {}", e);
        }
        ToolCallResult {
            id: call.id.clone(),
            name: call.name.clone(),
            outcome,
        }
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let tool = {
            let tools = self.tools.read().expect("registry lock");
            tools
                .get(&call.name)
                .map(|entry| Arc::clone(&entry.tool))
                .ok_or_else(|| ToolError::NotFound(call.name.clone()))?
        };

        // Parse before validate; neither failure invokes the executor.
        let args: Value = if call.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&call.arguments)
                .map_err(|e| ToolError::MalformedArguments(e.to_string()))?
        };

        tool.schema()
            .validate(&args)
            .map_err(ToolError::InvalidArguments)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            _ = tokio::time::sleep(self.call_timeout) => Err(ToolError::ExecutionFailed {
                tool: call.name.clone(),
                message: format!("timed out after {}s", self.call_timeout.as_secs()),
            }),
            result = tool.execute(args, cancel.child_token()) => {
                result.map_err(|e| ToolError::ExecutionFailed {
                    tool: call.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Execute every call concurrently. Completions are tagged with their
    /// input index and re-sorted, so results come back in call order no
    /// matter which call finishes first — one result per input call.
    pub async fn execute_many(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolCallResult> {
        let mut in_flight: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| async move { (index, self.execute_one(call, cancel).await) })
            .collect();

        let mut tagged = Vec::with_capacity(calls.len());
        while let Some(entry) = in_flight.next().await {
            tagged.push(entry);
        }
        tagged.sort_by_key(|(index, _)| *index);
        tagged.into_iter().map(|(_, result)| result).collect()
    }
}
