pub mod fs;
pub mod http;
pub mod shell;
pub mod sql;

pub use fs::{ListDirTool, ReadFileTool, WriteFileTool};
pub use http::HttpFetchTool;
pub use shell::ShellTool;
pub use sql::{PoolCache, SqlTool};

use crate::registry::Tool;
use std::sync::Arc;

/// The standard tool set: shell, filesystem, HTTP, and SQL.
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ShellTool::default()),
        Arc::new(ReadFileTool::default()),
        Arc::new(WriteFileTool::default()),
        Arc::new(ListDirTool::default()),
        Arc::new(HttpFetchTool::default()),
        Arc::new(SqlTool::new(Arc::new(PoolCache::default()))),
    ]
}
