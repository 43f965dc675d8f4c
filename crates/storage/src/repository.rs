use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── SNAPSHOT KEYS ─────────────────────────────────────────────────────────────
//

/// Fixed logical name of each persisted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKey {
    Progress,
    WordReviews,
    SessionPlan,
}

impl SnapshotKey {
    pub const ALL: [SnapshotKey; 3] = [
        SnapshotKey::Progress,
        SnapshotKey::WordReviews,
        SnapshotKey::SessionPlan,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKey::Progress => "progress",
            SnapshotKey::WordReviews => "word_reviews",
            SnapshotKey::SessionPlan => "session_plan",
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| StorageError::Serialization(format!("unknown snapshot key: {s}")))
    }
}

/// One persisted blob: an opaque payload plus the schema version it was written with.
///
/// Storage never interprets `payload`; decoding and version checks belong to the
/// service that owns the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: SnapshotKey,
    pub version: u32,
    pub payload: String,
    pub saved_at: DateTime<Utc>,
}

impl SnapshotRecord {
    #[must_use]
    pub fn new(
        key: SnapshotKey,
        version: u32,
        payload: impl Into<String>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            version,
            payload: payload.into(),
            saved_at,
        }
    }
}

/// Repository contract for keyed snapshots.
///
/// Each call is all-or-nothing: a `save` either replaces the whole blob or
/// leaves the previous one untouched.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Fetch the snapshot stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load(&self, key: SnapshotKey) -> Result<Option<SnapshotRecord>, StorageError>;

    /// Insert or replace the snapshot under `record.key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save(&self, record: &SnapshotRecord) -> Result<(), StorageError>;

    /// Remove the snapshot under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn delete(&self, key: SnapshotKey) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshots: Arc<Mutex<HashMap<SnapshotKey, SnapshotRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn load(&self, key: SnapshotKey) -> Result<Option<SnapshotRecord>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key).cloned())
    }

    async fn save(&self, record: &SnapshotRecord) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.key, record.clone());
        tracing::debug!(key = %record.key, version = record.version, "snapshot stored in memory");
        Ok(())
    }

    async fn delete(&self, key: SnapshotKey) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key);
        Ok(())
    }
}

/// Holds the snapshot repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotRepository>,
}

impl Storage {
    #[must_use]
    pub fn new(snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self { snapshots }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        let snapshots: Arc<dyn SnapshotRepository> = Arc::new(InMemoryRepository::new());
        Self { snapshots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use literacy_core::time::fixed_now;

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let repo = InMemoryRepository::new();
        let first = SnapshotRecord::new(SnapshotKey::Progress, 1, "{\"a\":1}", fixed_now());
        let second = SnapshotRecord::new(SnapshotKey::Progress, 1, "{\"a\":2}", fixed_now());

        repo.save(&first).await.unwrap();
        repo.save(&second).await.unwrap();

        let loaded = repo.load(SnapshotKey::Progress).await.unwrap().unwrap();
        assert_eq!(loaded.payload, "{\"a\":2}");
        assert!(repo.load(SnapshotKey::WordReviews).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = Storage::in_memory();
        let record = SnapshotRecord::new(SnapshotKey::SessionPlan, 1, "{}", fixed_now());
        storage.snapshots.save(&record).await.unwrap();

        storage.snapshots.delete(SnapshotKey::SessionPlan).await.unwrap();
        storage.snapshots.delete(SnapshotKey::SessionPlan).await.unwrap();
        assert!(storage.snapshots.load(SnapshotKey::SessionPlan).await.unwrap().is_none());
    }

    #[test]
    fn key_names_round_trip() {
        for key in SnapshotKey::ALL {
            assert_eq!(key.as_str().parse::<SnapshotKey>().unwrap(), key);
        }
        assert!(matches!(
            "lessons".parse::<SnapshotKey>(),
            Err(StorageError::Serialization(msg)) if msg.contains("lessons")
        ));
    }
}
