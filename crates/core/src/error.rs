//! Error types for the Luminous domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Luminous operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Loop bounds ---
    #[error("Tool loop exceeded: {reason}")]
    ToolLoopExceeded { rounds: usize, reason: String },

    // --- Concurrency ---
    #[error("Session busy: an advance is already in flight")]
    Busy,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable kind, used in log trails and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Provider(ProviderError::Timeout(_)) => "ProviderTimeout",
            Error::Provider(ProviderError::EmptyResponse(_)) => "ProviderEmptyResponse",
            Error::Provider(_) => "ProviderError",
            Error::Tool(e) => e.kind(),
            Error::Store(_) => "StoreError",
            Error::ToolLoopExceeded { .. } => "ToolLoopExceeded",
            Error::Busy => "Busy",
            Error::Config { .. } => "ConfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "InternalError",
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Empty or blocked response: {0}")]
    EmptyResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool not configured: {tool_name} requires {missing}")]
    Unconfigured { tool_name: String, missing: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Sandbox execution failed: {0}")]
    Sandbox(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "CapabilityNotFound",
            ToolError::Unconfigured { .. } => "CapabilityUnconfigured",
            ToolError::ExecutionFailed { .. } => "CapabilityExecutionError",
            ToolError::Sandbox(_) => "SandboxExecutionError",
            ToolError::Timeout { .. } => "CapabilityTimeout",
            ToolError::InvalidArguments(_) => "CapabilityArgumentError",
        }
    }
}

/// A non-fatal problem with a directive embedded in model text.
#[derive(Debug, Clone, Error)]
pub enum DirectiveError {
    #[error("StateDirectiveParseError: {0}")]
    StateParse(String),
}
