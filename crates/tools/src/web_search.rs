//! webSearch: real-time lookup through SerpApi.
//!
//! The answer is picked from the first populated field, in this order:
//! `answer_box.answer`, `answer_box.snippet`, `knowledge_graph.description`,
//! `organic_results[0].snippet`.

use async_trait::async_trait;
use luminous_core::error::ToolError;
use luminous_core::tool::{Tool, ToolContext};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

pub const NO_ANSWER: &str = "No definitive answer found.";

pub struct WebSearchTool {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

/// Pick the most direct answer out of a SerpApi response.
pub fn extract_answer(response: &Value) -> String {
    let candidates = [
        response.pointer("/answer_box/answer"),
        response.pointer("/answer_box/snippet"),
        response.pointer("/knowledge_graph/description"),
        response.pointer("/organic_results/0/snippet"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(NO_ANSWER)
        .to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "webSearch"
    }

    fn description(&self) -> &str {
        "Searches the web for real-time information on a given topic."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }
        let Some(api_key) = &self.api_key else {
            return Err(ToolError::Unconfigured {
                tool_name: self.name().to_string(),
                missing: "SERPAPI_API_KEY".into(),
            });
        };

        ctx.log(format!("Searching web for: {query}"));
        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[("q", query), ("api_key", api_key.as_str())])
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "SerpApi error");
            return Err(self.failed(format!(
                "search API returned {status}: {}",
                truncate(&body, 200)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| self.failed(format!("invalid search response: {e}")))?;
        let answer = extract_answer(&body);
        debug!(query, answer_len = answer.len(), "webSearch answered");

        Ok(json!({ "result": answer }))
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}…")
}
