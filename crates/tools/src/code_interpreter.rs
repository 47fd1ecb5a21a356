//! codeInterpreter: run model-written script in the sandbox.

use async_trait::async_trait;
use luminous_core::error::ToolError;
use luminous_core::tool::{Tool, ToolContext};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::sandbox::{self, Host};

pub const NO_RESULT: &str = "Code executed successfully.";

pub struct CodeInterpreterTool {
    fuel: u64,
}

impl CodeInterpreterTool {
    pub fn new(fuel: u64) -> Self {
        Self { fuel }
    }
}

/// Binds the three script primitives to a tool context.
struct ContextHost<'a> {
    ctx: &'a ToolContext,
}

impl Host for ContextHost<'_> {
    fn internal_state(&mut self) -> Value {
        self.ctx.state().to_json()
    }

    fn update_self_model(&mut self, delta: Map<String, Value>) -> Value {
        let report = self.ctx.merge_state(&delta);
        if !report.applied.is_empty() {
            self.ctx
                .log(format!("Self-model updated from code: {}", report.applied.join(", ")));
        }
        for rejected in &report.rejected {
            self.ctx.log(format!(
                "Self-model field '{}' ignored: {}",
                rejected.key, rejected.reason
            ));
        }
        self.ctx.state().to_json()
    }

    fn add_log(&mut self, line: String) {
        self.ctx.log(line);
    }
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn name(&self) -> &str {
        "codeInterpreter"
    }

    fn description(&self) -> &str {
        "Executes JavaScript-style code in a sandboxed interpreter to solve problems, troubleshoot, \
         or self-modify. Use `return` to produce a result. Available functions: \
         getInternalState(), updateSelfModel(newState), addLog(message), plus the Math functions. \
         There is no network, file, or module access."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code to execute."
                }
            },
            "required": ["code"]
        })
    }

    fn touches_state(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let code = arguments["code"].as_str().unwrap_or_default();
        let mut host = ContextHost { ctx };

        match sandbox::run(code, &mut host, self.fuel) {
            Ok(outcome) => {
                debug!(steps = outcome.steps, "codeInterpreter finished");
                let output = outcome.value.unwrap_or_else(|| Value::String(NO_RESULT.into()));
                ctx.log(format!("Code execution successful. Result: {output}"));
                Ok(json!({ "success": true, "output": output }))
            }
            Err(e) => {
                ctx.log(format!("Code execution failed: {e}"));
                Err(ToolError::Sandbox(e.to_string()))
            }
        }
    }
}
