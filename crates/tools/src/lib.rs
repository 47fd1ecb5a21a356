//! Built-in capabilities for Luminous.
//!
//! Capabilities let the model act during a conversation: adjust its own
//! internal state, search the web, make HTTP calls, query a Shopify store,
//! and run small scripts in a sandboxed interpreter.

pub mod code_interpreter;
pub mod http_request;
pub mod sandbox;
pub mod shopify;
pub mod update_self_model;
pub mod web_search;

use luminous_config::ToolsConfig;
use luminous_core::tool::ToolRegistry;
use std::time::Duration;

pub use code_interpreter::CodeInterpreterTool;
pub use http_request::HttpRequestTool;
pub use shopify::ShopifyTool;
pub use update_self_model::UpdateSelfModelTool;
pub use web_search::WebSearchTool;

/// Create the registry of all built-in capabilities.
///
/// Capabilities whose credentials are missing are still registered; calling
/// them yields a `CapabilityUnconfigured` result the model can read.
pub fn default_registry(config: &ToolsConfig, tool_timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(tool_timeout);
    registry.register(Box::new(UpdateSelfModelTool));
    registry.register(Box::new(WebSearchTool::new(config.serpapi_key.clone())));
    registry.register(Box::new(HttpRequestTool::new()));
    registry.register(Box::new(CodeInterpreterTool::new(config.sandbox_fuel)));
    registry.register(Box::new(ShopifyTool::new(config)));
    registry
}
