//! Plugin boundary: a fixed, narrow capability surface for loaded code.
//!
//! However a plugin gets loaded (static linking, dynamic loading, a script
//! host), it only ever sees a `PluginApi`: register a tool, register a
//! command, register a hook, and log under its own namespace. The core has
//! no further interaction with plugin internals.

use crate::registry::{Tool, ToolRegistry};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Implemented by plugin packs. `setup` is called once at load time with
/// the capability object.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn setup(&self, api: &PluginApi<'_>);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Loop boundaries a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    TurnStart,
    TurnEnd,
    ToolBatchStart,
    ToolBatchEnd,
}

pub type HookFn = Box<dyn Fn(&Value) + Send + Sync>;

/// Hooks fired by the agent loop at turn and tool-batch boundaries.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<HookEvent, Vec<HookFn>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: HookEvent, hook: HookFn) {
        self.hooks
            .write()
            .expect("hook lock")
            .entry(event)
            .or_default()
            .push(hook);
    }

    pub fn fire(&self, event: HookEvent, payload: &Value) {
        let hooks = self.hooks.read().expect("hook lock");
        if let Some(registered) = hooks.get(&event) {
            for hook in registered {
                hook(payload);
            }
        }
    }

    pub fn count(&self, event: HookEvent) -> usize {
        self.hooks
            .read()
            .expect("hook lock")
            .get(&event)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub type CommandFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Named commands contributed by plugins for the embedding surface (a CLI,
/// a REPL) to dispatch. The core only stores and runs them.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<BTreeMap<String, CommandFn>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: impl Into<String>, command: CommandFn) {
        self.commands
            .write()
            .expect("command lock")
            .insert(name.into(), command);
    }

    /// Run a named command; `None` if no plugin registered it.
    pub fn run(&self, name: &str, args: &str) -> Option<String> {
        let commands = self.commands.read().expect("command lock");
        commands.get(name).map(|command| command(args))
    }

    pub fn names(&self) -> Vec<String> {
        self.commands
            .read()
            .expect("command lock")
            .keys()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Host & capability object
// ---------------------------------------------------------------------------

/// Loader-side owner of everything plugins may touch.
pub struct PluginHost {
    registry: Arc<ToolRegistry>,
    commands: Arc<CommandRegistry>,
    hooks: Arc<HookRegistry>,
}

impl PluginHost {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            commands: Arc::new(CommandRegistry::new()),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Hand the plugin its capability object.
    pub fn load(&self, plugin: &dyn Plugin) {
        let api = PluginApi {
            host: self,
            plugin_name: plugin.name().to_string(),
        };
        tracing::info!(plugin = %api.plugin_name, "loading plugin");
        plugin.setup(&api);
    }

    pub fn commands(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.commands)
    }

    /// Hook registry to wire into `AgentLoop::with_hooks`.
    pub fn hooks(&self) -> Arc<HookRegistry> {
        Arc::clone(&self.hooks)
    }
}

/// The capability object: exactly `register_tool`, `register_command`,
/// `register_hook`, and a namespaced logger.
pub struct PluginApi<'a> {
    host: &'a PluginHost,
    plugin_name: String,
}

impl PluginApi<'_> {
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        tracing::debug!(plugin = %self.plugin_name, tool = tool.name(), "plugin registered tool");
        self.host.registry.register(tool);
    }

    pub fn register_command(&self, name: impl Into<String>, command: CommandFn) {
        self.host.commands.add(name, command);
    }

    pub fn register_hook(&self, event: HookEvent, hook: HookFn) {
        self.host.hooks.add(event, hook);
    }

    pub fn logger(&self) -> PluginLogger {
        PluginLogger {
            namespace: self.plugin_name.clone(),
        }
    }
}

/// Logger scoped to one plugin's namespace.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    namespace: String,
}

impl PluginLogger {
    pub fn debug(&self, message: &str) {
        tracing::debug!(plugin = %self.namespace, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.namespace, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.namespace, "{}", message);
    }
}
