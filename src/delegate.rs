//! Sub-agent delegation — fans independent tasks out to child agent loops.
//!
//! Each task runs in a fresh `AgentLoop` (context isolation: no shared
//! history with the parent or with sibling tasks). Scheduling is chosen
//! per batch:
//!
//! - `Parallel`: every task at once, bounded by a concurrency cap
//! - `Sequential`: one at a time, highest priority first
//! - `Smart`: high-priority tasks sequentially, the rest as one
//!   parallel batch
//!
//! One task's failure never aborts its siblings; every outcome is recorded
//! on the task itself.

use crate::agent::AgentLoop;
use crate::provider::ChatProvider;
use crate::registry::{Tool, ToolFailure, ToolRegistry};
use crate::retry::RetryConfig;
use crate::schema::{Field, Schema};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Assignee used when a task does not name a cooperating agent.
pub const DEFAULT_ASSIGNEE: &str = "default";

/// Default max tool-dispatch cycles for a delegated run (prevents runaway
/// sub-agents).
const DEFAULT_SUB_AGENT_ITERATIONS: usize = 10;

/// Default cap on concurrent sub-agent runs in parallel mode.
const DEFAULT_PARALLEL_LIMIT: usize = 8;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of delegated work. Shared by the orchestrator and the callback
/// loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Higher executes earlier; ties break by insertion order.
    pub priority: i64,
    /// Which cooperating agent should handle this.
    pub assignee: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration, set once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            priority: 0,
            assignee: DEFAULT_ASSIGNEE.to_string(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            duration_ms: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Parallel,
    Sequential,
    Smart,
}

impl std::str::FromStr for ScheduleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            "smart" => Ok(Self::Smart),
            other => Err(format!("unknown schedule mode: {}", other)),
        }
    }
}

/// Tunable rule for `Smart` scheduling: tasks at or above the threshold
/// run sequentially (ordering preserved where the caller signalled
/// importance), the remainder run as one parallel batch. A policy choice,
/// not a contract.
#[derive(Debug, Clone, Copy)]
pub struct SmartPolicy {
    pub priority_threshold: i64,
}

impl Default for SmartPolicy {
    fn default() -> Self {
        Self {
            priority_threshold: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-agent profiles
// ---------------------------------------------------------------------------

/// Everything needed to spin up one delegated agent loop.
pub struct SubAgentConfig {
    pub system_prompt: String,
    pub model: String,
    pub provider: Arc<dyn ChatProvider>,
    pub registry: Arc<ToolRegistry>,
    pub max_iterations: usize,
    pub retry: RetryConfig,
}

impl SubAgentConfig {
    pub fn new(provider: Arc<dyn ChatProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            system_prompt: String::new(),
            model: String::new(),
            provider,
            registry,
            max_iterations: DEFAULT_SUB_AGENT_ITERATIONS,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
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
}

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("no sub-agents configured")]
    NoAgents,
    #[error("no sub-agent configured for assignee '{0}'")]
    UnknownAssignee(String),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the cooperating-agent profiles and schedules delegated batches.
/// Constructed explicitly and passed where needed — no settable global.
pub struct SubAgentOrchestrator {
    agents: HashMap<String, Arc<SubAgentConfig>>,
    parallel_limit: Option<usize>,
    smart_policy: SmartPolicy,
}

impl SubAgentOrchestrator {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            parallel_limit: Some(DEFAULT_PARALLEL_LIMIT),
            smart_policy: SmartPolicy::default(),
        }
    }

    /// Register the profile used when a task names no assignee.
    pub fn with_default_agent(self, config: SubAgentConfig) -> Self {
        self.with_agent(DEFAULT_ASSIGNEE, config)
    }

    pub fn with_agent(mut self, name: impl Into<String>, config: SubAgentConfig) -> Self {
        self.agents.insert(name.into(), Arc::new(config));
        self
    }

    /// Cap on concurrent runs in parallel mode. `None` removes the bound.
    pub fn with_parallel_limit(mut self, limit: Option<usize>) -> Self {
        self.parallel_limit = limit;
        self
    }

    pub fn with_smart_policy(mut self, policy: SmartPolicy) -> Self {
        self.smart_policy = policy;
        self
    }

    pub fn has_agents(&self) -> bool {
        !self.agents.is_empty()
    }

    fn resolve(&self, assignee: &str) -> Result<Arc<SubAgentConfig>, DelegateError> {
        if let Some(config) = self.agents.get(assignee) {
            return Ok(Arc::clone(config));
        }
        self.agents
            .get(DEFAULT_ASSIGNEE)
            .map(Arc::clone)
            .ok_or_else(|| DelegateError::UnknownAssignee(assignee.to_string()))
    }

    /// Run a batch under the chosen mode. Returns one terminal task per
    /// input, in input order. Caller misuse (no agents wired, unresolvable
    /// assignee) is an error; individual task failures are not.
    pub async fn run_tasks(
        &self,
        tasks: Vec<Task>,
        mode: ScheduleMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<Task>, DelegateError> {
        if self.agents.is_empty() {
            return Err(DelegateError::NoAgents);
        }
        for task in &tasks {
            self.resolve(&task.assignee)?;
        }

        debug!(count = tasks.len(), ?mode, "dispatching delegated batch");
        match mode {
            ScheduleMode::Parallel => Ok(self.run_parallel(tasks, cancel).await),
            ScheduleMode::Sequential => Ok(self.run_sequential(tasks, cancel).await),
            ScheduleMode::Smart => Ok(self.run_smart(tasks, cancel).await),
        }
    }

    /// Run one task to a terminal state. Never returns an error — failures
    /// are recorded on the task.
    pub async fn run_task(&self, mut task: Task, cancel: &CancellationToken) -> Task {
        let config = match self.resolve(&task.assignee) {
            Ok(config) => config,
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
                task.duration_ms = Some(0);
                return task;
            }
        };

        task.status = TaskStatus::Running;
        let start = Instant::now();

        let mut agent = AgentLoop::new(Arc::clone(&config.provider), Arc::clone(&config.registry))
            .with_model(config.model.clone())
            .with_max_iterations(config.max_iterations)
            .with_retry_config(config.retry.clone());
        if !config.system_prompt.is_empty() {
            agent.set_system_prompt(config.system_prompt.clone());
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            outcome = agent.run(task.description.clone()) => Some(outcome),
        };

        match outcome {
            Some(Ok(run)) => {
                task.status = TaskStatus::Completed;
                task.result = Some(run.answer);
            }
            Some(Err(e)) => {
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
            }
            None => {
                task.status = TaskStatus::Failed;
                task.error = Some("cancelled".into());
            }
        }
        task.duration_ms = Some(start.elapsed().as_millis() as u64);
        task
    }

    async fn run_parallel(&self, tasks: Vec<Task>, cancel: &CancellationToken) -> Vec<Task> {
        let limit = self.parallel_limit.unwrap_or_else(|| tasks.len().max(1));
        let indexed = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| async move { (index, self.run_task(task, cancel).await) });

        let mut finished: Vec<(usize, Task)> =
            stream::iter(indexed).buffer_unordered(limit).collect().await;
        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, task)| task).collect()
    }

    async fn run_sequential(&self, tasks: Vec<Task>, cancel: &CancellationToken) -> Vec<Task> {
        // Highest priority first, ties by insertion order.
        let mut order: Vec<usize> = (0..tasks.len()).collect();
        order.sort_by_key(|&i| (std::cmp::Reverse(tasks[i].priority), i));

        let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
        let mut finished: Vec<(usize, Task)> = Vec::with_capacity(slots.len());
        for index in order {
            let task = slots[index].take().expect("task scheduled once");
            finished.push((index, self.run_task(task, cancel).await));
        }
        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, task)| task).collect()
    }

    async fn run_smart(&self, tasks: Vec<Task>, cancel: &CancellationToken) -> Vec<Task> {
        let threshold = self.smart_policy.priority_threshold;
        let mut high: Vec<(usize, Task)> = Vec::new();
        let mut rest: Vec<(usize, Task)> = Vec::new();
        for (index, task) in tasks.into_iter().enumerate() {
            if task.priority >= threshold {
                high.push((index, task));
            } else {
                rest.push((index, task));
            }
        }

        let mut finished: Vec<(usize, Task)> = Vec::new();

        high.sort_by_key(|(index, task)| (std::cmp::Reverse(task.priority), *index));
        for (index, task) in high {
            finished.push((index, self.run_task(task, cancel).await));
        }

        let limit = self.parallel_limit.unwrap_or_else(|| rest.len().max(1));
        let batched = rest
            .into_iter()
            .map(|(index, task)| async move { (index, self.run_task(task, cancel).await) });
        let batch_results: Vec<(usize, Task)> =
            stream::iter(batched).buffer_unordered(limit).collect().await;
        finished.extend(batch_results);

        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, task)| task).collect()
    }
}

impl Default for SubAgentOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Model-facing delegation tool
// ---------------------------------------------------------------------------

/// Exposes the orchestrator to the model as an ordinary tool. Wired by
/// explicit injection: construct with the orchestrator handle.
pub struct DelegateTool {
    orchestrator: Arc<SubAgentOrchestrator>,
}

impl DelegateTool {
    pub fn new(orchestrator: Arc<SubAgentOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Deserialize)]
struct DelegateArgs {
    tasks: Vec<DelegateTaskArg>,
    #[serde(default)]
    mode: Option<ScheduleMode>,
}

#[derive(Deserialize)]
struct DelegateTaskArg {
    description: String,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    assignee: Option<String>,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegate one or more independent tasks to sub-agents. Each task runs \
         in its own fresh conversation; results come back in task order."
    }

    fn schema(&self) -> Schema {
        let task_schema = Schema::object(vec![
            Field::required("description", Schema::String).describe("What the sub-agent should do"),
            Field::optional("priority", Schema::Integer)
                .describe("Higher runs earlier (default 0)"),
            Field::optional("assignee", Schema::String)
                .describe("Named cooperating agent to handle the task"),
        ]);
        Schema::object(vec![
            Field::required("tasks", Schema::array_of(task_schema)),
            Field::optional(
                "mode",
                Schema::string_enum(&["parallel", "sequential", "smart"]),
            )
            .describe("Scheduling mode (default parallel)"),
        ])
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let args: DelegateArgs =
            serde_json::from_value(args).map_err(|e| ToolFailure(e.to_string()))?;

        let tasks: Vec<Task> = args
            .tasks
            .into_iter()
            .map(|t| {
                let mut task = Task::new(t.description);
                if let Some(priority) = t.priority {
                    task = task.with_priority(priority);
                }
                if let Some(assignee) = t.assignee {
                    task = task.with_assignee(assignee);
                }
                task
            })
            .collect();

        let mode = args.mode.unwrap_or(ScheduleMode::Parallel);
        let finished = self
            .orchestrator
            .run_tasks(tasks, mode, &cancel)
            .await
            .map_err(|e| ToolFailure(e.to_string()))?;

        serde_json::to_value(&finished).map_err(|e| ToolFailure(e.to_string()))
    }
}
