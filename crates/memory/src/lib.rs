//! Session persistence for Luminous.
//!
//! Blob stores implement `luminous_core::BlobStore`; the
//! [`ConversationStore`] layers session (de)serialization and seeding on top.

pub mod conversation;
pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use conversation::{ConversationStore, open_store};
pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
