//! Versioned JSON codec between in-memory stores and the snapshot port.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use storage::repository::{SnapshotKey, SnapshotRecord, SnapshotRepository};

use crate::error::PersistError;

pub const PROGRESS_SCHEMA_VERSION: u32 = 1;
pub const WORD_REVIEWS_SCHEMA_VERSION: u32 = 1;
pub const SESSION_PLAN_SCHEMA_VERSION: u32 = 1;

/// Serialise `value` into a snapshot record.
///
/// # Errors
///
/// Returns `PersistError::Encode` if serialisation fails.
pub fn encode<T: Serialize>(
    key: SnapshotKey,
    version: u32,
    value: &T,
    saved_at: DateTime<Utc>,
) -> Result<SnapshotRecord, PersistError> {
    let payload = serde_json::to_string(value)?;
    Ok(SnapshotRecord::new(key, version, payload, saved_at))
}

/// Decode a snapshot, or `None` when it is for another schema version or does not parse.
#[must_use]
pub fn decode<T: DeserializeOwned>(record: &SnapshotRecord, expected_version: u32) -> Option<T> {
    if record.version != expected_version {
        tracing::warn!(
            key = %record.key,
            found = record.version,
            expected = expected_version,
            "discarding snapshot with unsupported schema version"
        );
        return None;
    }
    match serde_json::from_str(&record.payload) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key = %record.key, error = %err, "discarding malformed snapshot");
            None
        }
    }
}

/// Load and decode the snapshot stored under `key`.
///
/// Missing, outdated and malformed snapshots all yield `Ok(None)`.
///
/// # Errors
///
/// Returns `PersistError::Storage` if the backend itself fails.
pub async fn load_snapshot<T: DeserializeOwned>(
    repo: &dyn SnapshotRepository,
    key: SnapshotKey,
    expected_version: u32,
) -> Result<Option<T>, PersistError> {
    let Some(record) = repo.load(key).await? else {
        tracing::debug!(%key, "no snapshot stored");
        return Ok(None);
    };
    Ok(decode(&record, expected_version))
}

/// Encode and store `value` under `key` in one write.
///
/// # Errors
///
/// Returns `PersistError` if encoding or the write fails.
pub async fn save_snapshot<T: Serialize>(
    repo: &dyn SnapshotRepository,
    key: SnapshotKey,
    version: u32,
    value: &T,
    saved_at: DateTime<Utc>,
) -> Result<(), PersistError> {
    let record = encode(key, version, value, saved_at)?;
    repo.save(&record).await?;
    tracing::info!(%key, version, "snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use literacy_core::time::fixed_now;
    use std::collections::BTreeMap;
    use storage::repository::InMemoryRepository;

    #[test]
    fn decode_rejects_other_versions() {
        let record = SnapshotRecord::new(SnapshotKey::Progress, 7, "{}", fixed_now());
        let decoded: Option<BTreeMap<String, u32>> = decode(&record, 1);
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        let record = SnapshotRecord::new(SnapshotKey::Progress, 1, "not json", fixed_now());
        let decoded: Option<BTreeMap<String, u32>> = decode(&record, 1);
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_returns_value() {
        let repo = InMemoryRepository::new();
        let mut value = BTreeMap::new();
        value.insert("cat".to_string(), 3_u32);

        save_snapshot(&repo, SnapshotKey::WordReviews, 1, &value, fixed_now())
            .await
            .unwrap();
        let loaded: Option<BTreeMap<String, u32>> =
            load_snapshot(&repo, SnapshotKey::WordReviews, 1).await.unwrap();
        assert_eq!(loaded, Some(value));

        let missing: Option<BTreeMap<String, u32>> =
            load_snapshot(&repo, SnapshotKey::Progress, 1).await.unwrap();
        assert!(missing.is_none());
    }
}
