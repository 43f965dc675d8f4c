//! Shared error types for the services crate.

use thiserror::Error;

use literacy_core::model::SessionPlanError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted while reading or writing snapshots.
///
/// Malformed payloads are not errors: they are logged and replaced by empty state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by session flow operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no session is active")]
    NoActiveSession,
    #[error("a session is already active")]
    AlreadyActive,
    #[error("operation requires an auto-flow session")]
    NotAutoFlow,
    #[error("operation requires a menu-mode session")]
    NotMenuMode,
    #[error("an activity is already in progress")]
    ActivityInProgress,
    #[error("no activity is in progress")]
    NoActivityInProgress,
    #[error(transparent)]
    Plan(#[from] SessionPlanError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors emitted by session configuration constructors.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum FlowConfigError {
    #[error("auto-flow sessions need at least one step")]
    ZeroSteps,
    #[error("narrative cadence must be at least 2, got {0}")]
    InvalidNarrativeCadence(usize),
}

/// Errors emitted while bootstrapping the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
