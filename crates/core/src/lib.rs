//! # Luminous Core
//!
//! Domain types, traits, and error definitions for the Luminous
//! conversational relay. This crate has **zero framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is a trait here ([`Provider`], [`Tool`],
//! [`BlobStore`]). Implementations live in their respective crates, so
//! tests can swap in scripted providers and in-memory stores.
//!
//! All mutable conversation data lives in an explicit [`Session`] value
//! that is passed into, and returned from, every core call.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod state;
pub mod session;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{DirectiveError, Error, ProviderError, Result, StoreError, ToolError};
pub use message::{History, Part, Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
pub use state::{Dimension, InternalState, MergeReport};
pub use session::Session;
pub use store::BlobStore;
pub use event::{DomainEvent, EventBus};
