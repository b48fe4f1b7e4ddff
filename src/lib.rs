pub mod agent;
pub mod callback;
pub mod config;
pub mod delegate;
pub mod plugin;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod tools;
pub mod types;

pub use agent::{AgentError, AgentLoop, RunOutcome};
pub use callback::{CallbackLoop, CallbackSummary, JsonFileStore, ResultStore, StopCause};
pub use config::AgentConfig;
pub use delegate::{
    DelegateTool, ScheduleMode, SubAgentConfig, SubAgentOrchestrator, Task, TaskStatus,
};
pub use plugin::{Plugin, PluginApi, PluginHost};
pub use registry::{FnTool, Tool, ToolError, ToolFailure, ToolRegistry};
pub use retry::RetryConfig;
pub use schema::{Field, Schema};
pub use types::*;
