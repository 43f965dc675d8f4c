#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, SnapshotKey, SnapshotRecord, SnapshotRepository, Storage, StorageError,
};
