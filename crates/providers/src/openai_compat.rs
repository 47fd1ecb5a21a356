//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/v1/chat/completions` with function calling.

use async_trait::async_trait;
use luminous_core::error::ProviderError;
use luminous_core::message::{Part, Role, Turn};
use luminous_core::provider::*;
use luminous_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert the system directive and turns to OpenAI API format.
    ///
    /// A tool turn expands into one `tool` message per result.
    fn to_api_messages(system: Option<&str>, turns: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::new();
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(ApiMessage::text("system", system));
        }

        for turn in turns {
            match turn.role {
                Role::User => messages.push(ApiMessage::text("user", &turn.text())),
                Role::Model => {
                    let calls: Vec<ApiToolCall> = turn
                        .invocations()
                        .into_iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    let text = turn.text();
                    messages.push(ApiMessage {
                        role: "assistant".into(),
                        content: (!text.is_empty() || calls.is_empty()).then_some(text),
                        tool_calls: (!calls.is_empty()).then_some(calls),
                        tool_call_id: None,
                    });
                }
                Role::Tool => {
                    for part in &turn.parts {
                        if let Part::FunctionResponse(result) = part {
                            messages.push(ApiMessage {
                                role: "tool".into(),
                                content: Some(result.payload.to_string()),
                                tool_calls: None,
                                tool_call_id: Some(result.call_id.clone()),
                            });
                        }
                    }
                }
            }
        }
        messages
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn parse_choice(message: ApiMessage) -> Turn {
        let mut parts = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        for tc in message.tool_calls.unwrap_or_default() {
            // Unparsable arguments stay a string so validation rejects them.
            let arguments = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments));
            parts.push(Part::FunctionCall(ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments,
            }));
        }
        Turn::model_parts(parts)
    }
}

#[async_trait]
impl luminous_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.turns),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let (turn, blocked) = match api_response.choices.into_iter().next() {
            Some(choice) => {
                let blocked = choice
                    .finish_reason
                    .filter(|r| r == "content_filter");
                (Self::parse_choice(choice.message), blocked)
            }
            None => (Turn::model_parts(Vec::new()), None),
        };

        Ok(ProviderResponse {
            turn,
            usage,
            model: api_response.model,
            blocked,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_core::Provider;
    use luminous_core::message::History;
    use luminous_core::tool::ToolResult;

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn message_conversion_puts_system_first() {
        let turns = vec![Turn::user("Hello"), Turn::model("Hi")];
        let api = OpenAiCompatProvider::to_api_messages(Some("You are Luminous"), &turns);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
    }

    #[test]
    fn tool_turn_expands_per_result() {
        let a = ToolCall { id: "a".into(), name: "webSearch".into(), arguments: serde_json::json!({"query": "x"}) };
        let b = ToolCall { id: "b".into(), name: "httpRequest".into(), arguments: serde_json::json!({"url": "https://y"}) };
        let mut history = History::new();
        history
            .push(Turn::model_parts(vec![Part::FunctionCall(a.clone()), Part::FunctionCall(b.clone())]))
            .unwrap();
        history
            .push_tool_results(vec![
                ToolResult::ok(&a, serde_json::json!("one")),
                ToolResult::error(&b, "boom"),
            ])
            .unwrap();

        let api = OpenAiCompatProvider::to_api_messages(None, history.turns());
        assert_eq!(api.len(), 3);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[1].function.name, "httpRequest");
        assert!(api[0].content.is_none());
        assert_eq!(api[1].tool_call_id.as_deref(), Some("a"));
        assert_eq!(api[2].tool_call_id.as_deref(), Some("b"));
        assert!(api[2].content.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "webSearch".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "webSearch");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_choice_with_tool_calls() {
        let data = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "webSearch", "arguments": "{\"query\":\"rust\"}"}},
                {"id": "call_2", "type": "function", "function": {"name": "httpRequest", "arguments": "not json"}}
            ]
        }"#;
        let message: ApiMessage = serde_json::from_str(data).unwrap();
        let turn = OpenAiCompatProvider::parse_choice(message);
        let calls = turn.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["query"], "rust");
        assert_eq!(calls[1].arguments, serde_json::json!("not json"));
    }
}
