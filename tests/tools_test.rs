//! Tests for the builtin tool pack.

use agentry::registry::Tool;
use agentry::tools::{
    HttpFetchTool, ListDirTool, PoolCache, ReadFileTool, ShellTool, SqlTool, WriteFileTool,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

#[tokio::test]
async fn write_read_list_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let write = WriteFileTool::new().with_root(dir.path());
    let read = ReadFileTool::new().with_root(dir.path());
    let list = ListDirTool::new().with_root(dir.path());

    let result = write
        .execute(
            json!({"path": "notes/a.txt", "content": "hello files"}),
            cancel(),
        )
        .await
        .unwrap();
    assert!(result.as_str().unwrap().contains("11 bytes"));

    let content = read
        .execute(json!({"path": "notes/a.txt"}), cancel())
        .await
        .unwrap();
    assert_eq!(content.as_str().unwrap(), "hello files");

    let listing = list.execute(json!({"path": "."}), cancel()).await.unwrap();
    assert!(listing.as_str().unwrap().contains("notes/"));
}

#[tokio::test]
async fn sandbox_rejects_traversal_and_absolute_paths() {
    let dir = tempfile::tempdir().unwrap();
    let read = ReadFileTool::new().with_root(dir.path());

    let err = read
        .execute(json!({"path": "../outside.txt"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("traversal"));

    let err = read
        .execute(json!({"path": "/etc/hostname"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("absolute"));
}

#[tokio::test]
async fn read_reports_missing_files_as_failures() {
    let dir = tempfile::tempdir().unwrap();
    let read = ReadFileTool::new().with_root(dir.path());
    let err = read
        .execute(json!({"path": "missing.txt"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing.txt"));
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shell_captures_output_and_exit_code() {
    let shell = ShellTool::new();
    let result = shell
        .execute(json!({"command": "echo orchestration"}), cancel())
        .await
        .unwrap();
    let text = result.as_str().unwrap();
    assert!(text.contains("Exit code: 0"));
    assert!(text.contains("orchestration"));
}

#[tokio::test]
async fn shell_blocks_denied_patterns() {
    let shell = ShellTool::new();
    let err = shell
        .execute(json!({"command": "rm -rf / --no-preserve-root"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("safety policy"));
}

#[tokio::test]
async fn shell_times_out_long_commands() {
    let shell = ShellTool::new().with_timeout(Duration::from_millis(50));
    let err = shell
        .execute(json!({"command": "sleep 5"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sql_statements_and_queries_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("test.db").display().to_string();
    let tool = SqlTool::new(Arc::new(PoolCache::default())).with_default_database(db);

    let created = tool
        .execute(
            json!({"query": "CREATE TABLE crabs (name TEXT, legs INTEGER)"}),
            cancel(),
        )
        .await
        .unwrap();
    assert_eq!(created["rows_affected"], 0);

    tool.execute(
        json!({"query": "INSERT INTO crabs VALUES ('ferris', 10)"}),
        cancel(),
    )
    .await
    .unwrap();

    let rows = tool
        .execute(json!({"query": "SELECT name, legs FROM crabs"}), cancel())
        .await
        .unwrap();
    assert_eq!(rows["row_count"], 1);
    assert_eq!(rows["rows"][0]["name"], "ferris");
    assert_eq!(rows["rows"][0]["legs"], 10);
}

#[tokio::test]
async fn sql_requires_a_database() {
    let tool = SqlTool::new(Arc::new(PoolCache::default()));
    let err = tool
        .execute(json!({"query": "SELECT 1"}), cancel())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no database"));
}

#[tokio::test]
async fn pool_cache_reuses_connections_per_database() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PoolCache::new(4, Duration::from_secs(60));
    let dsn = format!("sqlite:{}?mode=rwc", dir.path().join("one.db").display());

    cache.acquire(&dsn).await.unwrap();
    cache.acquire(&dsn).await.unwrap();
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn pool_cache_evicts_least_recently_used_past_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PoolCache::new(2, Duration::from_secs(60));
    for name in ["a.db", "b.db", "c.db"] {
        let dsn = format!("sqlite:{}?mode=rwc", dir.path().join(name).display());
        cache.acquire(&dsn).await.unwrap();
    }
    assert_eq!(cache.len().await, 2);
}

#[tokio::test]
async fn pool_cache_expires_idle_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PoolCache::new(4, Duration::from_millis(20));
    let first = format!("sqlite:{}?mode=rwc", dir.path().join("a.db").display());
    let second = format!("sqlite:{}?mode=rwc", dir.path().join("b.db").display());

    cache.acquire(&first).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    cache.acquire(&second).await.unwrap();

    // The idle pool was expired on the next acquire.
    assert_eq!(cache.len().await, 1);
}

// ---------------------------------------------------------------------------
// HTTP fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_fetch_returns_status_and_body() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/greeting"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi from the wire"))
        .mount(&server)
        .await;

    let tool = HttpFetchTool::new();
    let result = tool
        .execute(json!({"url": format!("{}/greeting", server.uri())}), cancel())
        .await
        .unwrap();
    assert_eq!(result["status"], 200);
    assert_eq!(result["body"], "hi from the wire");
}

#[tokio::test]
async fn http_fetch_posts_a_body() {
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_string("payload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let tool = HttpFetchTool::new();
    let result = tool
        .execute(
            json!({
                "url": format!("{}/submit", server.uri()),
                "method": "post",
                "body": "payload"
            }),
            cancel(),
        )
        .await
        .unwrap();
    assert_eq!(result["status"], 201);
}
