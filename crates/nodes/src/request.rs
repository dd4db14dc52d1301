//! `request`: outbound HTTP call.
//!
//! In a synchronous workflow the call is made inline and the job completes
//! immediately. Otherwise the call is handed to the engine as deferred work
//! and the job suspends until the response (or failure) is delivered back
//! through `resume`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{ExecutionContext, Instruction, Job, JobResult, NodeError, Step};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A `name`/`value` pair used for headers, query params and form bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct NameValue {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Resolved configuration of a request node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub params: Vec<NameValue>,
    #[serde(default)]
    pub data: Value,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub ignore_fail: bool,
}

fn default_method() -> String {
    "POST".into()
}

fn default_content_type() -> String {
    JSON.into()
}

fn default_timeout() -> u64 {
    5000
}

impl RequestConfig {
    fn parse(config: &Value) -> Result<Self, NodeError> {
        let config: Self = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        if config.url.trim().is_empty() {
            return Err(NodeError::InvalidConfig("url must not be empty".into()));
        }
        if config.content_type != JSON && config.content_type != FORM {
            return Err(NodeError::InvalidConfig(format!(
                "unsupported content type '{}'",
                config.content_type
            )));
        }
        Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("invalid method '{}'", config.method)))?;

        Ok(config)
    }
}

/// Render a resolved JSON value as header/query/form text.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn pairs(entries: &[NameValue]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter(|entry| !entry.name.is_empty() && !entry.value.is_null())
        .map(|entry| (entry.name.clone(), as_text(&entry.value)))
        .collect()
}

// ---------------------------------------------------------------------------
// The call itself
// ---------------------------------------------------------------------------

async fn send(client: &Client, node_id: &str, config: &RequestConfig) -> JobResult {
    // Already validated by `RequestConfig::parse`.
    let method = Method::from_bytes(config.method.to_uppercase().as_bytes()).unwrap_or(Method::POST);

    let mut request = client
        .request(method.clone(), &config.url)
        .timeout(Duration::from_millis(config.timeout));

    for header in &config.headers {
        // The configured content type always wins.
        if header.name.is_empty() || header.name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        request = request.header(header.name.as_str(), as_text(&header.value));
    }
    request = request.header(CONTENT_TYPE, config.content_type.as_str());

    let query = pairs(&config.params);
    if !query.is_empty() {
        request = request.query(&query);
    }

    if method != Method::GET && !config.data.is_null() {
        request = if config.content_type == FORM {
            let entries: Vec<NameValue> = serde_json::from_value(config.data.clone()).unwrap_or_default();
            request.form(&pairs(&entries))
        } else {
            request.json(&config.data)
        };
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            let body = match response.text().await {
                Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                Err(e) => {
                    error!("request (#{}) response body unreadable: {}", node_id, e);
                    return JobResult::failed(json!({ "message": e.to_string() }));
                }
            };

            if status.is_success() {
                info!("request (#{}) response success, status: {}", node_id, status.as_u16());
                JobResult::resolved(body)
            } else {
                info!("request (#{}) response failed, status: {}", node_id, status.as_u16());
                JobResult::failed(json!({
                    "message": format!("request failed with status code {}", status.as_u16()),
                    "status": status.as_u16(),
                    "body": body,
                }))
            }
        }
        Err(e) => {
            error!("request (#{}) response failed: {}", node_id, e);
            JobResult::failed(json!({ "message": e.to_string() }))
        }
    }
}

// ---------------------------------------------------------------------------
// RequestInstruction
// ---------------------------------------------------------------------------

pub struct RequestInstruction {
    client: Client,
}

impl RequestInstruction {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for RequestInstruction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instruction for RequestInstruction {
    async fn run(&self, ctx: &ExecutionContext) -> Result<Step, NodeError> {
        let config = RequestConfig::parse(&ctx.config)?;

        if ctx.sync {
            return Ok(Step::Complete(send(&self.client, &ctx.node_id, &config).await));
        }

        info!(
            "request (#{}) to \"{}\" scheduled, waiting for response...",
            ctx.node_id, config.url
        );
        let client = self.client.clone();
        let node_id = ctx.node_id.clone();
        Ok(Step::defer(async move { send(&client, &node_id, &config).await }))
    }

    async fn resume(
        &self,
        _ctx: &ExecutionContext,
        _job: &Job,
        outcome: JobResult,
    ) -> Result<JobResult, NodeError> {
        Ok(outcome)
    }
}
