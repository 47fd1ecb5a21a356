//! Shared test helpers: a scripted provider and a slow capability.

use async_trait::async_trait;
use luminous_core::error::{ProviderError, ToolError};
use luminous_core::message::{Part, Turn};
use luminous_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use luminous_core::tool::{Tool, ToolCall, ToolContext};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided, unless the
/// script repeats its last response.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
            delay: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<ToolCall>, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls),
            make_text_response(answer),
        ])
    }

    /// Create a provider that requests the same capability forever.
    pub fn always_calling(name: &str) -> Self {
        let mut provider = Self::new(vec![make_tool_call_response(vec![make_tool_call(
            name,
            json!({}),
        )])]);
        provider.repeat_last = true;
        provider
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        let index = if self.repeat_last {
            (*count).min(responses.len() - 1)
        } else {
            *count
        };
        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        }

        let response = responses[index].clone();
        *count += 1;
        Ok(response)
    }
}

fn respond(turn: Turn, blocked: Option<String>) -> ProviderResponse {
    ProviderResponse {
        turn,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        blocked,
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    respond(Turn::model(text), None)
}

/// Create a response that only requests capabilities.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>) -> ProviderResponse {
    respond(
        Turn::model_parts(tool_calls.into_iter().map(Part::FunctionCall).collect()),
        None,
    )
}

/// Create a response the provider refused to produce.
pub fn make_blocked_response(reason: &str) -> ProviderResponse {
    respond(Turn::model_parts(Vec::new()), Some(reason.into()))
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments,
    }
}

/// A capability that sleeps, then logs "<name> finished".
pub struct SleepyTool {
    name: String,
    delay: Duration,
}

impl SleepyTool {
    pub fn new(name: &str, delay_ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps for a while"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        ctx.log(format!("{} finished", self.name));
        Ok(json!({ "tool": self.name }))
    }
}
