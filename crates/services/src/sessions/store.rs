use std::sync::Arc;

use literacy_core::Clock;
use literacy_core::model::{SessionMode, SessionPlan, UnitId};
use storage::repository::{SnapshotKey, SnapshotRepository};

use crate::error::PersistError;
use crate::persistence::{SESSION_PLAN_SCHEMA_VERSION, decode, save_snapshot};

/// Persists the in-flight session plan so it can be resumed after a restart.
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SnapshotRepository>,
    clock: Clock,
}

impl SessionStore {
    #[must_use]
    pub fn new(repo: Arc<dyn SnapshotRepository>, clock: Clock) -> Self {
        Self { repo, clock }
    }

    /// # Errors
    ///
    /// Returns `PersistError` if encoding or the write fails.
    pub async fn save_session(&self, plan: &SessionPlan) -> Result<(), PersistError> {
        save_snapshot(
            self.repo.as_ref(),
            SnapshotKey::SessionPlan,
            SESSION_PLAN_SCHEMA_VERSION,
            plan,
            self.clock.now(),
        )
        .await
    }

    /// Restore the saved plan if it is still resumable for `current_unit`.
    ///
    /// Plans for another unit, finished guided plans and unreadable snapshots
    /// are discarded and cleared. Menu plans always sit at the end of their
    /// history, so they stay resumable.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Storage` if the backend fails.
    pub async fn load_session(
        &self,
        current_unit: UnitId,
    ) -> Result<Option<SessionPlan>, PersistError> {
        let Some(record) = self.repo.load(SnapshotKey::SessionPlan).await? else {
            return Ok(None);
        };
        let decoded = decode::<SessionPlan>(&record, SESSION_PLAN_SCHEMA_VERSION);

        let stale_reason = match &decoded {
            None => Some("unreadable"),
            Some(plan) if plan.validate().is_err() => Some("invalid"),
            Some(plan) if plan.unit() != current_unit => Some("unit changed"),
            Some(plan) if plan.mode() == SessionMode::Auto && plan.is_complete() => {
                Some("already complete")
            }
            Some(_) => None,
        };
        if let Some(reason) = stale_reason {
            tracing::info!(reason, %current_unit, "discarding saved session");
            self.clear_session().await?;
            return Ok(None);
        }

        if let Some(plan) = &decoded {
            tracing::info!(
                plan_id = %plan.id(),
                step = plan.current_step_index(),
                "resuming saved session"
            );
        }
        Ok(decoded)
    }

    /// # Errors
    ///
    /// Returns `PersistError::Storage` if the backend fails.
    pub async fn clear_session(&self) -> Result<(), PersistError> {
        self.repo.delete(SnapshotKey::SessionPlan).await?;
        Ok(())
    }

    pub fn advance_clock(&mut self, delta: chrono::Duration) {
        self.clock.advance(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::plan::{
        AutoFlowConfig, advance_step, create_auto_flow_session, create_menu_mode_session,
    };
    use literacy_core::model::{ActivityKind, SessionStep};
    use literacy_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, SnapshotRecord};

    fn store() -> (SessionStore, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        (SessionStore::new(repo.clone(), fixed_clock()), repo)
    }

    fn plan(unit: u32) -> SessionPlan {
        let words: Vec<String> = ["cat", "sat", "mat", "hat"].map(String::from).to_vec();
        create_auto_flow_session(UnitId::new(unit), &words, &AutoFlowConfig::default(), fixed_now())
            .unwrap()
    }

    #[tokio::test]
    async fn round_trip_when_unit_matches() {
        let (store, _) = store();
        let plan = advance_step(&advance_step(&plan(3)));
        store.save_session(&plan).await.unwrap();

        let loaded = store.load_session(UnitId::new(3)).await.unwrap().unwrap();
        assert_eq!(loaded, plan);
        assert_eq!(loaded.current_step_index(), 2);
    }

    #[tokio::test]
    async fn menu_plan_with_history_round_trips() {
        let (store, repo) = store();
        let mut plan = create_menu_mode_session(UnitId::new(2), fixed_now()).unwrap();
        plan.push_completed(SessionStep::word(ActivityKind::BuildWord, "pin"))
            .unwrap();
        store.save_session(&plan).await.unwrap();

        let loaded = store.load_session(UnitId::new(2)).await.unwrap().unwrap();
        assert_eq!(loaded, plan);
        assert!(repo.load(SnapshotKey::SessionPlan).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn finished_auto_plan_is_discarded() {
        let (store, repo) = store();
        let mut plan = plan(1);
        while !plan.is_complete() {
            plan = advance_step(&plan);
        }
        store.save_session(&plan).await.unwrap();

        assert!(store.load_session(UnitId::new(1)).await.unwrap().is_none());
        assert!(repo.load(SnapshotKey::SessionPlan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_unit_is_discarded_and_cleared() {
        let (store, repo) = store();
        store.save_session(&plan(2)).await.unwrap();

        assert!(store.load_session(UnitId::new(3)).await.unwrap().is_none());
        assert!(repo.load(SnapshotKey::SessionPlan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_plan_is_discarded() {
        let (store, repo) = store();
        repo.save(&SnapshotRecord::new(
            SnapshotKey::SessionPlan,
            SESSION_PLAN_SCHEMA_VERSION,
            r#"{"mode":"auto"}"#,
            fixed_now(),
        ))
        .await
        .unwrap();
        assert!(store.load_session(UnitId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_saved_plan() {
        let (store, _) = store();
        store.save_session(&plan(1)).await.unwrap();
        store.clear_session().await.unwrap();
        assert!(store.load_session(UnitId::new(1)).await.unwrap().is_none());
    }
}
