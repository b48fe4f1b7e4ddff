//! Filesystem tools — read, write, and list, optionally sandboxed to a
//! root directory.

use crate::registry::{Tool, ToolFailure};
use crate::schema::{Field, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Resolve a tool-supplied path against an optional sandbox root.
/// With a root set, absolute paths and `..` traversal are rejected.
fn resolve(root: &Option<PathBuf>, path: &str) -> Result<PathBuf, ToolFailure> {
    let requested = Path::new(path);
    match root {
        None => Ok(requested.to_path_buf()),
        Some(root) => {
            if requested.is_absolute() {
                return Err(ToolFailure::new("absolute paths are not allowed"));
            }
            if requested
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(ToolFailure::new("path traversal is not allowed"));
            }
            Ok(root.join(requested))
        }
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

pub struct ReadFileTool {
    pub root: Option<PathBuf>,
    /// Max bytes returned; longer files are truncated with a marker.
    pub max_bytes: usize,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self {
            root: None,
            max_bytes: 256 * 1024,
        }
    }
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its contents."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::required("path", Schema::String).describe("Path of the file to read")
        ])
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'path' parameter"))?;
        let path = resolve(&self.root, path)?;

        let mut content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolFailure::new(format!("failed to read {}: {}", path.display(), e)))?;
        if content.len() > self.max_bytes {
            content.truncate(self.max_bytes);
            content.push_str("\n... (truncated)");
        }
        Ok(Value::String(content))
    }
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct WriteFileTool {
    pub root: Option<PathBuf>,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. \
         Overwrites existing files."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::required("path", Schema::String).describe("Path of the file to write"),
            Field::required("content", Schema::String),
        ])
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'path' parameter"))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'content' parameter"))?;
        let path = resolve(&self.root, path)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ToolFailure::new(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolFailure::new(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(Value::String(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ListDirTool {
    pub root: Option<PathBuf>,
}

impl ListDirTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are suffixed with '/'."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::optional("path", Schema::String).describe("Directory to list (default '.')")
        ])
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let path = args["path"].as_str().unwrap_or(".");
        let path = resolve(&self.root, path)?;

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ToolFailure::new(format!("failed to list {}: {}", path.display(), e)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolFailure::new(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(Value::String(entries.join("\n")))
    }
}
