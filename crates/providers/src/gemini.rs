//! Gemini native provider implementation.
//!
//! Uses the Generative Language API `generateContent` endpoint directly.
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System directive as top-level `systemInstruction`
//! - Native function calling with `functionCall` / `functionResponse` parts
//! - Safety blocks surfaced through `ProviderResponse::blocked`

use async_trait::async_trait;
use luminous_core::error::ProviderError;
use luminous_core::message::{Part, Role, Turn};
use luminous_core::provider::*;
use luminous_core::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Schema keywords the function-declaration endpoint rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["additionalProperties", "default", "$schema"];

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert turns to Gemini `contents`. Tool turns travel as `user`
    /// content holding `functionResponse` parts.
    fn to_contents(turns: &[Turn]) -> Vec<GeminiContent> {
        turns
            .iter()
            .map(|turn| GeminiContent {
                role: match turn.role {
                    Role::Model => "model".into(),
                    Role::User | Role::Tool => "user".into(),
                },
                parts: turn.parts.iter().map(Self::to_part).collect(),
            })
            .filter(|c| !c.parts.is_empty())
            .collect()
    }

    fn to_part(part: &Part) -> GeminiPart {
        match part {
            Part::Text(text) => GeminiPart {
                text: Some(text.clone()),
                ..GeminiPart::default()
            },
            Part::FunctionCall(call) => GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    id: None,
                    name: call.name.clone(),
                    args: match &call.arguments {
                        Value::Null => json!({}),
                        other => other.clone(),
                    },
                }),
                ..GeminiPart::default()
            },
            Part::FunctionResponse(result) => GeminiPart {
                function_response: Some(Self::to_function_response(result)),
                ..GeminiPart::default()
            },
        }
    }

    fn to_function_response(result: &ToolResult) -> GeminiFunctionResponse {
        GeminiFunctionResponse {
            name: result.name.clone(),
            response: json!({
                "name": result.name,
                "content": result.payload,
            }),
        }
    }

    /// Convert tool definitions to one `functionDeclarations` block.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        if tools.is_empty() {
            return Vec::new();
        }
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": sanitize_schema(&t.parameters),
                })
            })
            .collect();
        vec![json!({ "functionDeclarations": declarations })]
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let mut generation = json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            generation["maxOutputTokens"] = json!(max_tokens);
        }

        let mut body = json!({
            "contents": Self::to_contents(&request.turns),
            "generationConfig": generation,
        });
        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        let tools = Self::to_api_tools(&request.tools);
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }

    /// Turn a parsed API response into our domain response.
    fn parse_response(api: GeminiResponse, requested_model: &str) -> ProviderResponse {
        let usage = api.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        let model = api.model_version.unwrap_or_else(|| requested_model.to_string());

        let mut blocked = api.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = api.candidates.into_iter().next();

        let mut parts = Vec::new();
        if let Some(candidate) = candidate {
            let content_parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for (index, part) in content_parts.into_iter().enumerate() {
                if let Some(call) = part.function_call {
                    parts.push(Part::FunctionCall(ToolCall {
                        id: call
                            .id
                            .unwrap_or_else(|| format!("call_{index}_{}", uuid::Uuid::new_v4().simple())),
                        name: call.name,
                        arguments: call.args,
                    }));
                } else if let Some(text) = part.text.filter(|_| !part.thought.unwrap_or(false)) {
                    parts.push(Part::Text(text));
                }
            }
            if parts.is_empty() && blocked.is_none() {
                blocked = candidate
                    .finish_reason
                    .filter(|r| matches!(r.as_str(), "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST"));
            }
        }

        ProviderResponse {
            turn: Turn::model_parts(parts),
            usage,
            model,
            blocked,
        }
    }
}

/// Strip schema keywords the endpoint does not accept, recursively.
///
/// The endpoint takes a single `type` per schema, so a union collapses to
/// `"string"` when it offers one, otherwise to its first member.
fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&k.as_str()))
                .map(|(k, v)| match (k.as_str(), v) {
                    ("type", Value::Array(types)) => (k.clone(), collapse_type(types)),
                    _ => (k.clone(), sanitize_schema(v)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

fn collapse_type(types: &[Value]) -> Value {
    let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
    let chosen = if names.contains(&"string") {
        "string"
    } else {
        names.iter().copied().find(|t| *t != "null").unwrap_or("string")
    };
    json!(chosen)
}

#[async_trait]
impl luminous_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key missing (set GEMINI_API_KEY or api_key)".into(),
            ));
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: GeminiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let parsed = Self::parse_response(api_response, &request.model);
        if let Some(reason) = &parsed.blocked {
            warn!(reason = %reason, "Gemini blocked the response");
        }
        Ok(parsed)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_core::Provider;
    use luminous_core::message::History;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: json!({"query": "rust"}),
        }
    }

    #[test]
    fn default_constructor() {
        let provider = GeminiProvider::new("key");
        assert_eq!(provider.name(), "gemini");
        assert!(provider.base_url.contains("generativelanguage"));
        let custom = GeminiProvider::new("key").with_base_url("http://localhost:9000/");
        assert_eq!(custom.base_url, "http://localhost:9000");
    }

    #[test]
    fn tool_turns_travel_as_user_function_responses() {
        let mut history = History::new();
        history.push(Turn::user("look it up")).unwrap();
        history
            .push(Turn::model_parts(vec![Part::FunctionCall(call("c1", "webSearch"))]))
            .unwrap();
        history
            .push_tool_results(vec![ToolResult::ok(&call("c1", "webSearch"), json!("Rust 1.88"))])
            .unwrap();

        let contents = GeminiProvider::to_contents(history.turns());
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[1].parts[0].function_call.as_ref().unwrap().name, "webSearch");
        assert_eq!(contents[2].role, "user");
        let response = contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.response["content"], json!("Rust 1.88"));
        assert_eq!(response.response["name"], json!("webSearch"));
    }

    #[test]
    fn body_carries_system_tools_and_temperature() {
        let request = ProviderRequest {
            model: "gemini-2.5-pro".into(),
            system: Some("You are Luminous.".into()),
            turns: vec![Turn::user("hi")],
            temperature: 0.7,
            max_tokens: Some(1024),
            tools: vec![ToolDefinition {
                name: "httpRequest".into(),
                description: "HTTP".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"headers": {"type": "object", "additionalProperties": {"type": "string"}}},
                    "required": []
                }),
            }],
        };
        let body = GeminiProvider::build_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are Luminous.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        let decl = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "httpRequest");
        assert!(decl["parameters"]["properties"]["headers"].get("additionalProperties").is_none());
    }

    fn collect_types<'a>(schema: &'a Value, out: &mut Vec<&'a Value>) {
        match schema {
            Value::Object(map) => {
                for (key, value) in map {
                    if key == "type" {
                        out.push(value);
                    }
                    collect_types(value, out);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| collect_types(item, out)),
            _ => {}
        }
    }

    #[test]
    fn union_schema_types_collapse_to_one() {
        let request = ProviderRequest {
            model: "gemini-2.5-pro".into(),
            system: None,
            turns: vec![Turn::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![ToolDefinition {
                name: "httpRequest".into(),
                description: "HTTP".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "headers": {"type": ["object", "string"]},
                        "count": {"type": ["null", "integer"]},
                        "nested": {
                            "type": "object",
                            "properties": {"flag": {"type": ["boolean"]}}
                        }
                    },
                    "required": []
                }),
            }],
        };
        let body = GeminiProvider::build_body(&request);
        let parameters = &body["tools"][0]["functionDeclarations"][0]["parameters"];

        let mut types = Vec::new();
        collect_types(parameters, &mut types);
        assert_eq!(types.len(), 5);
        assert!(types.iter().all(|t| t.is_string()));
        assert_eq!(parameters["properties"]["headers"]["type"], "string");
        assert_eq!(parameters["properties"]["count"]["type"], "integer");
        assert_eq!(parameters["properties"]["nested"]["properties"]["flag"]["type"], "boolean");
    }

    #[test]
    fn parse_text_response() {
        let api: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3, "totalTokenCount": 13},
            "modelVersion": "gemini-2.5-pro-001"
        }))
        .unwrap();
        let parsed = GeminiProvider::parse_response(api, "gemini-2.5-pro");
        assert_eq!(parsed.turn.text(), "Hello there");
        assert_eq!(parsed.model, "gemini-2.5-pro-001");
        assert_eq!(parsed.usage.unwrap().total_tokens, 13);
        assert!(parsed.blocked.is_none());
    }

    #[test]
    fn parse_function_calls_synthesizes_ids() {
        let api: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "webSearch", "args": {"query": "a"}}},
                    {"functionCall": {"id": "given", "name": "httpRequest", "args": {"url": "https://x"}}}
                ]}
            }]
        }))
        .unwrap();
        let parsed = GeminiProvider::parse_response(api, "m");
        let calls = parsed.turn.invocations();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].id.starts_with("call_0_"));
        assert_eq!(calls[1].id, "given");
        assert_eq!(calls[1].arguments["url"], "https://x");
    }

    #[test]
    fn parse_blocked_prompt() {
        let api: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let parsed = GeminiProvider::parse_response(api, "m");
        assert!(parsed.is_empty());
        assert_eq!(parsed.blocked.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn parse_safety_finish_without_parts() {
        let api: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        let parsed = GeminiProvider::parse_response(api, "m");
        assert_eq!(parsed.blocked.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn thought_parts_are_not_user_text() {
        let api: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"text": "pondering", "thought": true},
                {"text": "answer"}
            ]}}]
        }))
        .unwrap();
        let parsed = GeminiProvider::parse_response(api, "m");
        assert_eq!(parsed.turn.text(), "answer");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let provider = GeminiProvider::new("");
        let err = provider
            .complete(ProviderRequest {
                model: "gemini-2.5-pro".into(),
                system: None,
                turns: vec![Turn::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
