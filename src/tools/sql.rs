//! SQL tool — run queries against SQLite databases through an explicit,
//! bounded connection-pool cache.
//!
//! The cache is injected at construction and owned by the tool: bounded
//! entry count, least-recently-used eviction, idle-timeout expiry. No
//! module-global state, no background eviction timers — expiry happens on
//! the next acquire, which keeps the lifecycle deterministic and testable.

use crate::registry::{Tool, ToolFailure};
use crate::schema::{Field, Schema};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default bound on distinct databases held open.
const DEFAULT_MAX_ENTRIES: usize = 4;
/// Default idle expiry for a cached pool.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
/// Max rows returned per query.
const DEFAULT_MAX_ROWS: usize = 200;

struct PoolEntry {
    dsn: String,
    pool: SqlitePool,
    last_used: Instant,
}

/// Bounded LRU cache of SQLite pools, keyed by DSN.
pub struct PoolCache {
    max_entries: usize,
    idle_timeout: Duration,
    entries: tokio::sync::Mutex<Vec<PoolEntry>>,
}

impl PoolCache {
    pub fn new(max_entries: usize, idle_timeout: Duration) -> Self {
        Self {
            max_entries,
            idle_timeout,
            entries: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// A pool for `dsn`, reusing a cached one when present. Evicts idle
    /// entries first, then the least-recently-used entry if over capacity.
    pub async fn acquire(&self, dsn: &str) -> Result<SqlitePool, sqlx::Error> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let mut expired = Vec::new();
        let idle_timeout = self.idle_timeout;
        entries.retain_mut(|entry| {
            if now.duration_since(entry.last_used) > idle_timeout {
                expired.push(entry.pool.clone());
                false
            } else {
                true
            }
        });
        for pool in expired {
            debug!("closing idle database pool");
            pool.close().await;
        }

        if let Some(entry) = entries.iter_mut().find(|e| e.dsn == dsn) {
            entry.last_used = now;
            return Ok(entry.pool.clone());
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(dsn)
            .await?;

        if entries.len() >= self.max_entries {
            if let Some(lru) = (0..entries.len()).min_by_key(|&i| entries[i].last_used) {
                let evicted = entries.remove(lru);
                debug!(dsn = %evicted.dsn, "evicting least-recently-used database pool");
                evicted.pool.close().await;
            }
        }

        entries.push(PoolEntry {
            dsn: dsn.to_string(),
            pool: pool.clone(),
            last_used: now,
        });
        Ok(pool)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for PoolCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_IDLE_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// The tool
// ---------------------------------------------------------------------------

pub struct SqlTool {
    cache: Arc<PoolCache>,
    /// Database used when the call names none.
    pub default_database: Option<String>,
    pub max_rows: usize,
}

impl SqlTool {
    pub fn new(cache: Arc<PoolCache>) -> Self {
        Self {
            cache,
            default_database: None,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    fn dsn(database: &str) -> String {
        if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{}?mode=rwc", database)
        }
    }
}

#[async_trait]
impl Tool for SqlTool {
    fn name(&self) -> &str {
        "sql"
    }

    fn description(&self) -> &str {
        "Run a SQL statement against a SQLite database. SELECT returns rows \
         as JSON; other statements return the affected-row count."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::required("query", Schema::String),
            Field::optional("database", Schema::String)
                .describe("Database file path (defaults to the configured database)"),
        ])
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'query' parameter"))?;
        let database = args["database"]
            .as_str()
            .map(str::to_string)
            .or_else(|| self.default_database.clone())
            .ok_or_else(|| ToolFailure::new("no database given and none configured"))?;

        let pool = self
            .cache
            .acquire(&Self::dsn(&database))
            .await
            .map_err(|e| ToolFailure::new(format!("failed to open {}: {}", database, e)))?;

        let head = query.trim_start().to_ascii_lowercase();
        if head.starts_with("select") || head.starts_with("with") || head.starts_with("pragma") {
            let rows = sqlx::query(query)
                .fetch_all(&pool)
                .await
                .map_err(|e| ToolFailure::new(format!("query failed: {}", e)))?;
            let truncated = rows.len() > self.max_rows;
            let rendered: Vec<Value> = rows
                .iter()
                .take(self.max_rows)
                .map(row_to_json)
                .collect();
            let mut result = json!({ "rows": rendered, "row_count": rows.len() });
            if truncated {
                result["truncated"] = json!(true);
            }
            Ok(result)
        } else {
            let done = sqlx::query(query)
                .execute(&pool)
                .await
                .map_err(|e| ToolFailure::new(format!("statement failed: {}", e)))?;
            Ok(json!({ "rows_affected": done.rows_affected() }))
        }
    }
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut obj = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "REAL" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "BLOB" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .ok()
                .flatten()
                .map(|bytes| Value::from(format!("<{} bytes>", bytes.len()))),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
        };
        obj.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(obj)
}
