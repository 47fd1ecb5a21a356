//! httpRequest: a pass-through HTTP call.
//!
//! The response body is handed back untouched; only log lines truncate it.

use async_trait::async_trait;
use luminous_core::error::ToolError;
use luminous_core::tool::{Tool, ToolContext, validate_arguments};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

use crate::web_search::truncate;

const LOG_BODY_CHARS: usize = 200;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept headers as a JSON object or as the string form of one.
fn parse_headers(value: &Value) -> Result<HeaderMap, ToolError> {
    let object: Map<String, Value> = match value {
        Value::Null => return Ok(HeaderMap::new()),
        Value::Object(map) => map.clone(),
        Value::String(s) if s.trim().is_empty() => return Ok(HeaderMap::new()),
        Value::String(s) => serde_json::from_str(s).map_err(|e| {
            ToolError::InvalidArguments(format!("'headers' is not a JSON object: {e}"))
        })?,
        _ => {
            return Err(ToolError::InvalidArguments(
                "'headers' must be an object or a JSON string".into(),
            ));
        }
    };

    let mut headers = HeaderMap::new();
    for (name, value) in object {
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ToolError::InvalidArguments(format!("bad header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(&text)
            .map_err(|e| ToolError::InvalidArguments(format!("bad header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "httpRequest"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL and return the status code and raw response body."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to send the request to"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method (GET, POST, PUT, PATCH, DELETE). Defaults to GET."
                },
                "headers": {
                    "type": "string",
                    "description": "Optional HTTP headers as a JSON object string, e.g. {\"Accept\": \"text/plain\"}"
                },
                "body": {
                    "type": "string",
                    "description": "Optional request body, sent verbatim"
                }
            },
            "required": ["url"]
        })
    }

    /// Headers may also arrive as a bare object; check them as their string form.
    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let schema = self.parameters_schema();
        match arguments.get("headers") {
            Some(headers @ Value::Object(_)) => {
                let mut relaxed = arguments.clone();
                relaxed["headers"] = Value::String(headers.to_string());
                validate_arguments(&schema, &relaxed)
            }
            _ => validate_arguments(&schema, arguments),
        }
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let url = arguments["url"].as_str().unwrap_or_default();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let method = arguments["method"].as_str().unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ToolError::InvalidArguments(format!("Invalid HTTP method: {method}")))?;
        let headers = parse_headers(&arguments["headers"])?;

        ctx.log(format!("HTTP {method} {url}"));
        let mut request = self.client.request(method.clone(), url).headers(headers);
        if let Some(body) = arguments["body"].as_str() {
            request = request.body(body.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failed(format!("{method} {url}: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("reading body: {e}")))?;

        ctx.log(format!(
            "HTTP {status} from {url}: {}",
            truncate(&body, LOG_BODY_CHARS)
        ));
        debug!(status, bytes = body.len(), "httpRequest complete");

        Ok(json!({ "status": status, "body": body }))
    }
}
