//! HTTP fetch tool — GET/POST with a response-size cap.

use crate::registry::{Tool, ToolFailure};
use crate::schema::{Field, Schema};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct HttpFetchTool {
    client: reqwest::Client,
    /// Max response body bytes returned to the model.
    pub max_body_bytes: usize,
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            max_body_bytes: 256 * 1024,
        }
    }
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP. Returns the status code and response body."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::required("url", Schema::String),
            Field::optional("method", Schema::string_enum(&["get", "post"]))
                .describe("HTTP method (default get)"),
            Field::optional("body", Schema::String).describe("Request body for post"),
        ])
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'url' parameter"))?;
        let method = args["method"].as_str().unwrap_or("get");

        let request = match method {
            "post" => {
                let mut request = self.client.post(url);
                if let Some(body) = args["body"].as_str() {
                    request = request.body(body.to_string());
                }
                request
            }
            _ => self.client.get(url),
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolFailure::new("cancelled")),
            response = request.send() => {
                response.map_err(|e| ToolFailure::new(format!("request failed: {}", e)))?
            }
        };

        let status = response.status().as_u16();
        let mut body = response
            .text()
            .await
            .map_err(|e| ToolFailure::new(format!("failed to read body: {}", e)))?;
        if body.len() > self.max_body_bytes {
            body.truncate(self.max_body_bytes);
            body.push_str("\n... (truncated)");
        }

        Ok(json!({ "status": status, "body": body }))
    }
}
