//! shopify: read-only store lookups through the Admin REST API.

use async_trait::async_trait;
use luminous_config::ToolsConfig;
use luminous_core::error::ToolError;
use luminous_core::tool::{Tool, ToolContext};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::warn;

use crate::web_search::truncate;

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 250;

pub struct ShopifyTool {
    store: Option<String>,
    access_token: Option<String>,
    api_version: String,
    base_url: Option<String>,
    client: reqwest::Client,
}

impl ShopifyTool {
    pub fn new(config: &ToolsConfig) -> Self {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Self {
            store: present(&config.shopify_store),
            access_token: present(&config.shopify_access_token),
            api_version: config.shopify_api_version.clone(),
            base_url: None,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Send requests to `url` instead of `https://{store}`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, store: &str, resource: &str) -> String {
        let root = match &self.base_url {
            Some(base) => base.clone(),
            None => {
                let host = store
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/');
                format!("https://{host}")
            }
        };
        format!("{root}/admin/api/{}/{resource}.json", self.api_version)
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for ShopifyTool {
    fn name(&self) -> &str {
        "shopify"
    }

    fn description(&self) -> &str {
        "Accesses the configured Shopify store to retrieve products, orders, or shop details."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "The action to perform.",
                    "enum": ["list_products", "list_orders", "shop_info"]
                },
                "limit": {
                    "type": "number",
                    "description": "The number of items to retrieve (1-250, default 10)."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let (Some(store), Some(token)) = (&self.store, &self.access_token) else {
            return Err(ToolError::Unconfigured {
                tool_name: self.name().to_string(),
                missing: "SHOPIFY_STORE and SHOPIFY_ACCESS_TOKEN".into(),
            });
        };

        let action = arguments["action"].as_str().unwrap_or_default();
        let limit = match arguments.get("limit").and_then(Value::as_f64) {
            None => DEFAULT_LIMIT,
            Some(n) if n.fract() == 0.0 && (1.0..=MAX_LIMIT as f64).contains(&n) => n as u64,
            Some(n) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'limit' must be an integer between 1 and {MAX_LIMIT}, got {n}"
                )));
            }
        };

        let (resource, key, paged) = match action {
            "list_products" => ("products", "products", true),
            "list_orders" => ("orders", "orders", true),
            "shop_info" => ("shop", "shop", false),
            other => {
                return Err(ToolError::InvalidArguments(format!("unknown action '{other}'")));
            }
        };

        ctx.log(format!("Accessing Shopify: {action}"));
        let mut request = self
            .client
            .get(self.endpoint(store, resource))
            .header("X-Shopify-Access-Token", token.as_str());
        if paged {
            request = request.query(&[("limit", limit.to_string())]);
            if resource == "orders" {
                request = request.query(&[("status", "any")]);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, action, "Shopify API error");
            return Err(self.failed(format!(
                "Shopify returned {status}: {}",
                truncate(&body, 200)
            )));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| self.failed(format!("invalid Shopify response: {e}")))?;
        let data = body.get_mut(key).map(Value::take).unwrap_or(Value::Null);
        if let Some(items) = data.as_array() {
            ctx.log(format!("Shopify returned {} {key}", items.len()));
        }

        let mut out = serde_json::Map::new();
        out.insert("action".into(), Value::String(action.to_string()));
        out.insert(key.into(), data);
        Ok(Value::Object(out))
    }
}
