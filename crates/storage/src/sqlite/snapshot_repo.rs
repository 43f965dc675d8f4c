use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{SnapshotKey, SnapshotRecord, SnapshotRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn map_snapshot_row(row: &sqlx::sqlite::SqliteRow) -> Result<SnapshotRecord, StorageError> {
    let key: String = row.try_get("key").map_err(ser)?;
    let version: i64 = row.try_get("version").map_err(ser)?;
    let version = u32::try_from(version)
        .map_err(|_| StorageError::Serialization(format!("invalid version: {version}")))?;
    Ok(SnapshotRecord {
        key: key.parse()?,
        version,
        payload: row.try_get("payload").map_err(ser)?,
        saved_at: row.try_get("saved_at").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn load(&self, key: SnapshotKey) -> Result<Option<SnapshotRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT key, version, payload, saved_at
                FROM snapshots
                WHERE key = ?1
            ",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_snapshot_row).transpose()
    }

    async fn save(&self, record: &SnapshotRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO snapshots (key, version, payload, saved_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    version = excluded.version,
                    payload = excluded.payload,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(record.key.as_str())
        .bind(i64::from(record.version))
        .bind(&record.payload)
        .bind(record.saved_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        tracing::debug!(key = %record.key, bytes = record.payload.len(), "snapshot written");
        Ok(())
    }

    async fn delete(&self, key: SnapshotKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM snapshots WHERE key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
