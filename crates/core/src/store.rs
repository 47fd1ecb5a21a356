//! Store trait: durable key/value persistence for session blobs.
//!
//! The relay persists exactly one session under one fixed key. Stores treat
//! the value as an opaque string and replace it whole on every write.

use async_trait::async_trait;
use crate::error::StoreError;

/// The core BlobStore trait.
///
/// Implementations: in-memory (for testing), JSON files, SQLite.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "memory").
    fn name(&self) -> &str;

    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError>;
}
