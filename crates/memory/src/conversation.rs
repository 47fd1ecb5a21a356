//! The conversation store: load and save the single session blob.

use luminous_config::StorageConfig;
use luminous_core::error::StoreError;
use luminous_core::session::Session;
use luminous_core::store::BlobStore;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{FileStore, InMemoryStore};

/// Loads and saves one [`Session`] under a fixed key.
///
/// When nothing is stored yet, `load` returns the seed session (the
/// core-memory preamble) without writing it.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn BlobStore>,
    key: String,
    seed: Session,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            seed: Session::default(),
        }
    }

    /// The session returned when the store is empty.
    pub fn with_seed(mut self, seed: Session) -> Self {
        self.seed = seed;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seed(&self) -> &Session {
        &self.seed
    }

    /// Load the stored session, or the seed when none exists.
    pub async fn load(&self) -> Result<Session, StoreError> {
        match self.backend.get(&self.key).await? {
            Some(blob) => {
                let session: Session = serde_json::from_str(&blob)
                    .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.key)))?;
                debug!(key = %self.key, turns = session.history.len(), "Session loaded");
                Ok(session)
            }
            None => {
                info!(key = %self.key, "No stored session, starting from seed");
                Ok(self.seed.clone())
            }
        }
    }

    /// Replace the stored session.
    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let blob = serde_json::to_string(session)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize session: {e}")))?;
        self.backend.set(&self.key, &blob).await
    }

    /// Overwrite the stored session with the seed.
    pub async fn reset(&self) -> Result<Session, StoreError> {
        self.save(&self.seed).await?;
        Ok(self.seed.clone())
    }
}

/// Open the blob store named by `config.backend`.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StoreError> {
    let path = config.resolved_path();
    let store: Arc<dyn BlobStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "file" => Arc::new(FileStore::new(path)),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create data directory: {e}"))
                })?;
            }
            Arc::new(crate::SqliteStore::new(&path.to_string_lossy()).await?)
        }
        other => {
            return Err(StoreError::Storage(format!(
                "Storage backend '{other}' is not available"
            )));
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_core::message::{History, Turn};
    use luminous_core::state::Dimension;

    fn seed() -> Session {
        let mut history = History::new();
        history.push(Turn::user("CORE_MEMORY")).unwrap();
        history.push(Turn::model("Acknowledged.")).unwrap();
        Session::new(history)
    }

    #[tokio::test]
    async fn empty_store_loads_seed_without_writing() {
        let backend = Arc::new(InMemoryStore::new());
        let store = ConversationStore::new(backend.clone(), "luminous_session").with_seed(seed());
        let session = store.load().await.unwrap();
        assert_eq!(session.history.len(), 2);
        assert!(backend.get("luminous_session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let store = ConversationStore::new(Arc::new(InMemoryStore::new()), "k").with_seed(seed());
        let mut session = store.load().await.unwrap();
        session.history.push(Turn::user("hello")).unwrap();
        session.state.merge(serde_json::json!({"novelty": 0.2}).as_object().unwrap());
        session.keepsake = Some("a small thing".into());
        store.save(&session).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.state.get(Dimension::Novelty), 0.2);
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error() {
        let backend = Arc::new(InMemoryStore::new());
        backend.set("k", "not json").await.unwrap();
        let store = ConversationStore::new(backend, "k");
        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn reset_writes_seed() {
        let backend = Arc::new(InMemoryStore::new());
        backend.set("k", "not json").await.unwrap();
        let store = ConversationStore::new(backend, "k").with_seed(seed());
        store.reset().await.unwrap();
        assert_eq!(store.load().await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn open_store_by_backend_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: "file".into(),
            path: Some(dir.path().join("sessions")),
            session_key: "luminous_session".into(),
        };
        assert_eq!(open_store(&config).await.unwrap().name(), "file");

        let config = StorageConfig {
            backend: "sqlite".into(),
            path: Some(dir.path().join("data/luminous.db")),
            ..config
        };
        assert_eq!(open_store(&config).await.unwrap().name(), "sqlite");

        let config = StorageConfig {
            backend: "redis".into(),
            ..config
        };
        assert!(open_store(&config).await.is_err());
    }
}
