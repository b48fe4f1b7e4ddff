//! Callback loop — a durable, priority-ordered task queue for work that
//! would blow through a single request/response timeout.
//!
//! Long tasks are decomposed into many short agent turns: each queue pop
//! runs one cooperating agent's loop on one task description, and the
//! agent's reply may enqueue follow-on tasks (`TASK: ...` directive lines).
//! Pop order is priority-then-insertion; a flood of high-priority tasks can
//! starve low-priority ones indefinitely — an accepted tradeoff.

use crate::delegate::{SubAgentOrchestrator, Task, TaskStatus};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on processed tasks per `run`.
const DEFAULT_MAX_TASKS: usize = 25;
/// Default bound on simultaneously queued tasks.
const DEFAULT_MAX_QUEUED: usize = 50;

// ---------------------------------------------------------------------------
// Queue ordering
// ---------------------------------------------------------------------------

struct Queued {
    task: Task,
    /// Monotonic enqueue counter; breaks priority ties in favor of the
    /// earlier-queued task.
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower seq (earlier insert).
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ---------------------------------------------------------------------------
// Outcomes & errors
// ---------------------------------------------------------------------------

/// Why a `run` stopped. All three are clean stops, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Queue drained to empty.
    Drained,
    /// Processed-task bound reached with work still queued.
    QueueBoundExceeded,
    /// `halt()` was called.
    Halted,
}

#[derive(Debug, Clone)]
pub struct CallbackSummary {
    pub processed: usize,
    pub stop: StopCause,
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback loop has no sub-agents wired")]
    NotWired,
}

// ---------------------------------------------------------------------------
// Persistence boundary
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// External store for terminal-task snapshots. Returns a location
/// identifier for the persisted snapshot.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, tasks: &[Task]) -> Result<String, StoreError>;
}

/// Local JSON-file store.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn persist(&self, tasks: &[Task]) -> Result<String, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("tasks-{}.json", crate::types::now_ms()));
        let payload = serde_json::to_vec_pretty(tasks)?;
        tokio::fs::write(&path, payload).await?;
        Ok(path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

pub struct CallbackLoop {
    orchestrator: Arc<SubAgentOrchestrator>,
    queue: BinaryHeap<Queued>,
    completed: Vec<Task>,
    seq: u64,
    max_tasks: usize,
    max_queued: usize,
    halt: CancellationToken,
}

impl CallbackLoop {
    pub fn new(orchestrator: Arc<SubAgentOrchestrator>) -> Self {
        Self {
            orchestrator,
            queue: BinaryHeap::new(),
            completed: Vec::new(),
            seq: 0,
            max_tasks: DEFAULT_MAX_TASKS,
            max_queued: DEFAULT_MAX_QUEUED,
            halt: CancellationToken::new(),
        }
    }

    /// Bound on tasks processed per `run`.
    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = max;
        self
    }

    /// Bound on simultaneously queued tasks; follow-ons past it are dropped
    /// with a warning.
    pub fn with_max_queued(mut self, max: usize) -> Self {
        self.max_queued = max;
        self
    }

    /// Enqueue a pending task; returns its id.
    pub fn add_task(
        &mut self,
        description: impl Into<String>,
        assignee: impl Into<String>,
        priority: i64,
    ) -> String {
        let task = Task::new(description)
            .with_assignee(assignee)
            .with_priority(priority);
        let id = task.id.clone();
        self.enqueue(task);
        id
    }

    fn enqueue(&mut self, task: Task) -> bool {
        if self.queue.len() >= self.max_queued {
            warn!(
                max = self.max_queued,
                "task queue full, dropping: {}", task.description
            );
            return false;
        }
        self.queue.push(Queued {
            task,
            seq: self.seq,
        });
        self.seq += 1;
        true
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Ask a running loop to stop after the current task.
    pub fn halt(&self) {
        self.halt.cancel();
    }

    /// Seed the queue and drain it, one short agent turn per task.
    pub async fn run(&mut self, initial: Task) -> Result<CallbackSummary, CallbackError> {
        if !self.orchestrator.has_agents() {
            return Err(CallbackError::NotWired);
        }
        self.enqueue(initial);

        let mut processed = 0usize;
        let stop = loop {
            if self.halt.is_cancelled() {
                break StopCause::Halted;
            }
            if processed >= self.max_tasks {
                break StopCause::QueueBoundExceeded;
            }
            let Some(next) = self.queue.pop() else {
                break StopCause::Drained;
            };

            let task = next.task;
            debug!(id = %task.id, priority = task.priority, "running queued task");
            let finished = self.orchestrator.run_task(task, &self.halt).await;
            processed += 1;

            if finished.status == TaskStatus::Completed {
                if let Some(text) = &finished.result {
                    for (priority, description) in parse_directives(text) {
                        let follow_on = Task::new(description)
                            .with_assignee(finished.assignee.clone())
                            .with_priority(priority);
                        self.enqueue(follow_on);
                    }
                }
            }
            self.completed.push(finished);
        };

        info!(processed, ?stop, "callback loop stopped");
        Ok(CallbackSummary { processed, stop })
    }

    /// Snapshot of all terminal tasks, in completion order.
    pub fn get_results(&self) -> Vec<Task> {
        self.completed.clone()
    }

    /// Persist the terminal snapshot; returns the store's location
    /// identifier.
    pub async fn export_results(&self, store: &dyn ResultStore) -> Result<String, StoreError> {
        store.persist(&self.completed).await
    }

    /// Discard all queued and completed tasks, resetting to empty.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.completed.clear();
        self.seq = 0;
        self.halt = CancellationToken::new();
    }
}

/// Parse follow-on directives out of an agent reply. Recognized forms, one
/// per line: `TASK: <description>` and `TASK(<priority>): <description>`.
fn parse_directives(text: &str) -> Vec<(i64, String)> {
    let mut directives = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("TASK:") {
            let description = rest.trim();
            if !description.is_empty() {
                directives.push((0, description.to_string()));
            }
        } else if let Some(rest) = line.strip_prefix("TASK(") {
            if let Some((priority, description)) = rest.split_once("):") {
                if let Ok(priority) = priority.trim().parse::<i64>() {
                    let description = description.trim();
                    if !description.is_empty() {
                        directives.push((priority, description.to_string()));
                    }
                }
            }
        }
    }
    directives
}
