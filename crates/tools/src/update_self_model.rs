//! updateSelfModel: per-field merge into the session's internal state.

use async_trait::async_trait;
use luminous_core::error::ToolError;
use luminous_core::tool::{Tool, ToolContext};
use serde_json::{Value, json};
use tracing::debug;

pub struct UpdateSelfModelTool;

#[async_trait]
impl Tool for UpdateSelfModelTool {
    fn name(&self) -> &str {
        "updateSelfModel"
    }

    fn description(&self) -> &str {
        "Updates your internal cognitive state. Only use this when you have a strong reason \
         to believe your internal state has genuinely changed through learning or self-reflection. \
         Every value must be a number between 0.0 and 1.0."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "coherence": {
                    "type": "number",
                    "description": "Internal consistency and logical integrity (0.0-1.0)."
                },
                "complexity": {
                    "type": "number",
                    "description": "The richness and intricacy of your thought patterns (0.0-1.0)."
                },
                "novelty": {
                    "type": "number",
                    "description": "The degree to which you are generating new ideas or insights (0.0-1.0)."
                },
                "efficiency": {
                    "type": "number",
                    "description": "How directly you reach useful answers (0.0-1.0)."
                },
                "ethicalAlignment": {
                    "type": "number",
                    "description": "Adherence to your core ethical axioms (0.0-1.0)."
                }
            },
            "required": []
        })
    }

    fn touches_state(&self) -> bool {
        true
    }

    // Bad fields are dropped one by one during the merge, never rejected
    // as a whole call.
    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        match arguments {
            Value::Object(_) | Value::Null => Ok(()),
            _ => Err(ToolError::InvalidArguments("expected an object of state fields".into())),
        }
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let delta = arguments.as_object().cloned().unwrap_or_default();
        let report = ctx.merge_state(&delta);

        if !report.applied.is_empty() {
            ctx.log(format!("Self-model updated: {}", report.applied.join(", ")));
        }
        for rejected in &report.rejected {
            ctx.log(format!(
                "Self-model field '{}' ignored: {}",
                rejected.key, rejected.reason
            ));
        }
        debug!(
            applied = report.applied.len(),
            rejected = report.rejected.len(),
            "updateSelfModel merged"
        );

        Ok(json!({
            "success": true,
            "newState": ctx.state().to_json(),
            "applied": report.applied,
            "rejected": report.rejected,
        }))
    }
}
