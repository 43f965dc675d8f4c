use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;
use tokio::sync::oneshot;

use literacy_core::Clock;
use literacy_core::model::{
    ActivityKind, ActivityResult, ContentCatalog, Difficulty, ItemId, LessonId, LetterProgression,
    Score, SessionMode, SessionPlan, SessionStep, Smoothness, SubjectId, UnitId,
};
use literacy_core::scheduler::AppliedReview;
use storage::repository::Storage;

use crate::config::EngineConfig;
use crate::error::{EngineError, PersistError, SessionError};
use crate::progress_store::ProgressStore;
use crate::sessions::{AdvanceTimer, FlowState, SessionFlow, SessionStore, get_recommended_mode};
use crate::word_review::WordReviewScheduler;

/// What finishing one activity changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityOutcome {
    pub result: ActivityResult,
    pub leveled_up: bool,
    pub session_complete: bool,
}

/// One learner's engine: progress, word reviews and the running session.
///
/// Built explicitly from its collaborators; nothing is global. Mutations stay
/// in memory until [`LearnerEngine::persist`], except the session plan, which
/// is saved after every transition so it can be resumed.
pub struct LearnerEngine {
    storage: Storage,
    catalog: Arc<dyn ContentCatalog>,
    clock: Clock,
    config: EngineConfig,
    subject: SubjectId,
    progress: ProgressStore,
    reviews: WordReviewScheduler,
    sessions: SessionStore,
    flow: SessionFlow,
    pending_advance: Option<AdvanceTimer>,
    advance_due: Arc<AtomicBool>,
}

impl LearnerEngine {
    /// Restore every store from `storage` and resume a saved session for `current_unit`.
    ///
    /// Unusable snapshots fall back to empty state.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the storage backend fails.
    pub async fn load(
        storage: Storage,
        catalog: Arc<dyn ContentCatalog>,
        clock: Clock,
        config: EngineConfig,
        subject: SubjectId,
        current_unit: UnitId,
    ) -> Result<Self, EngineError> {
        let repo = storage.snapshots.as_ref();
        let mut progress = ProgressStore::load(repo, config.mastery.clone(), clock).await?;
        progress.initialize_subject(&subject);
        let reviews = WordReviewScheduler::load(repo, config.review.clone(), clock).await?;
        let sessions = SessionStore::new(Arc::clone(&storage.snapshots), clock);

        let mut flow = SessionFlow::new(config.auto_flow);
        if let Some(plan) = sessions.load_session(current_unit).await? {
            flow.resume(plan)?;
        }

        tracing::info!(%subject, %current_unit, state = ?flow.state(), "learner engine ready");
        Ok(Self {
            storage,
            catalog,
            clock,
            config,
            subject,
            progress,
            reviews,
            sessions,
            flow,
            pending_advance: None,
            advance_due: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Only offer new words whose letters have been introduced by the session's unit.
    #[must_use]
    pub fn with_letter_progression(mut self, letters: LetterProgression) -> Self {
        self.reviews.set_letter_progression(letters);
        self
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    #[must_use]
    pub fn reviews(&self) -> &WordReviewScheduler {
        &self.reviews
    }

    #[must_use]
    pub fn flow(&self) -> &SessionFlow {
        &self.flow
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Mode suggested by the learner's completed units and review history.
    #[must_use]
    pub fn recommended_mode(&self) -> SessionMode {
        get_recommended_mode(
            self.progress.completed_unit_count(&self.subject),
            self.reviews.total_reviews(),
            &self.config.recommendation,
        )
    }

    /// Start a session in `mode` for `unit` and save the new plan.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if a session is already active or the plan cannot be saved.
    pub async fn start_session(
        &mut self,
        mode: SessionMode,
        unit: UnitId,
    ) -> Result<SessionPlan, SessionError> {
        let now = self.clock.now();
        let plan = match mode {
            SessionMode::Auto => {
                self.flow
                    .start_auto(unit, &self.reviews, self.catalog.as_ref(), now)?
            }
            SessionMode::Menu => self.flow.start_menu(unit, now)?,
        }
        .clone();
        self.progress.unlock_unit(&self.subject, unit);
        self.sessions.save_session(&plan).await?;
        Ok(plan)
    }

    /// Next playable step of a guided session; saves the plan if steps were skipped.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` outside a guided session or if saving fails.
    pub async fn next_step(&mut self) -> Result<Option<SessionStep>, SessionError> {
        let before = self.flow.plan().map(SessionPlan::current_step_index);
        let step = self.flow.next_step(self.catalog.as_ref())?;
        let after = self.flow.plan().map(SessionPlan::current_step_index);
        if before != after {
            self.sync_session().await?;
        }
        Ok(step)
    }

    /// Draw content for `kind` in a menu session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` outside the menu hub.
    pub fn request_activity(
        &mut self,
        kind: ActivityKind,
    ) -> Result<Option<SessionStep>, SessionError> {
        self.flow
            .request_activity(kind, &self.reviews, self.catalog.as_ref())
    }

    /// Record a lesson result and complete its unit once every lesson of the
    /// unit is done. Returns `true` when this call completed the unit.
    pub fn complete_lesson(&mut self, lesson: &LessonId, score: Score) -> bool {
        self.progress.complete_lesson(&self.subject, lesson, score);
        let Some(unit) = self.catalog.unit_of_lesson(lesson) else {
            tracing::debug!(%lesson, "lesson belongs to no known unit");
            return false;
        };
        let all_done = unit
            .lessons
            .iter()
            .all(|l| self.progress.is_lesson_completed(&self.subject, l));
        all_done && self.progress.complete_unit(&self.subject, unit.unit_id)
    }

    /// Record one attempt at a non-word item, such as a sentence. Returns the new mastery.
    pub fn record_item_attempt(&mut self, item: &ItemId, success: bool) -> f64 {
        self.progress
            .record_item_attempt(&self.subject, item, success)
    }

    /// Record one attempt at `word`: item mastery and the word's review record.
    ///
    /// The two stores are updated independently.
    pub fn record_word_practice(
        &mut self,
        word: &str,
        unit: UnitId,
        smoothness: Smoothness,
        success: bool,
    ) -> AppliedReview {
        self.progress
            .record_item_attempt(&self.subject, &ItemId::new(word), success);
        self.reviews.record_review(word, unit, smoothness, success)
    }

    /// Award XP for the current activity and move the session on.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if no activity is being played or saving the plan fails.
    pub async fn finish_activity(
        &mut self,
        score: Score,
        difficulty: Difficulty,
        is_first_completion: bool,
    ) -> Result<ActivityOutcome, SessionError> {
        let current = if self.flow.state() == FlowState::Running {
            // Steps the catalog cannot supply are never scored.
            self.next_step().await?
        } else {
            self.flow.current_activity().cloned()
        };
        let activity = current
            .map(|step| step.activity)
            .ok_or(SessionError::NoActivityInProgress)?;

        let result = ActivityResult::scored(
            activity,
            score,
            difficulty,
            is_first_completion,
            self.clock.now(),
        );
        let leveled_up = self.progress.complete_activity(&result);
        self.flow.complete_step()?;
        let session_complete = self.flow.state() == FlowState::Complete;
        self.sync_session().await?;

        Ok(ActivityOutcome {
            result,
            leveled_up,
            session_complete,
        })
    }

    /// Arm the pause between an activity's feedback and the next guided step.
    ///
    /// The receiver resolves once the pause is over; then call
    /// [`LearnerEngine::advance_if_due`]. A previous pending advance is
    /// replaced. Exiting or resetting cancels it, and the receiver then
    /// resolves with an error.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAutoFlow` in menu mode and
    /// `SessionError::NoActiveSession` when no guided session is running.
    pub fn schedule_advance(
        &mut self,
        delay: std::time::Duration,
    ) -> Result<oneshot::Receiver<()>, SessionError> {
        match self.flow.state() {
            FlowState::Running => {}
            FlowState::Hub | FlowState::ActivityInProgress => {
                return Err(SessionError::NotAutoFlow);
            }
            FlowState::ModeSelection | FlowState::Complete => {
                return Err(SessionError::NoActiveSession);
            }
        }
        self.cancel_advance();

        let (tx, rx) = oneshot::channel();
        let due = Arc::clone(&self.advance_due);
        self.pending_advance = Some(AdvanceTimer::schedule(delay, move || {
            due.store(true, Ordering::Release);
            let _ = tx.send(());
        }));
        Ok(rx)
    }

    /// Drop a pending advance. Returns `true` if one was cancelled before firing.
    pub fn cancel_advance(&mut self) -> bool {
        let cancelled = self
            .pending_advance
            .take()
            .is_some_and(|timer| timer.cancel());
        // A callback racing the cancel only ever sets the old flag.
        self.advance_due = Arc::new(AtomicBool::new(false));
        cancelled
    }

    /// Move to the next guided step if a scheduled advance has fired.
    ///
    /// Returns `Ok(None)` and leaves the plan untouched when nothing is due.
    ///
    /// # Errors
    ///
    /// Same as [`LearnerEngine::next_step`].
    pub async fn advance_if_due(&mut self) -> Result<Option<SessionStep>, SessionError> {
        if !self.advance_due.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        self.pending_advance = None;
        self.next_step().await
    }

    /// Leave the current session and forget its saved plan.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if the saved plan cannot be cleared.
    pub async fn exit_session(&mut self) -> Result<Option<SessionPlan>, PersistError> {
        self.cancel_advance();
        let plan = self.flow.exit();
        self.sessions.clear_session().await?;
        Ok(plan)
    }

    /// Save the progress and word review stores.
    ///
    /// # Errors
    ///
    /// Returns the first `PersistError`; the other store may already be written.
    pub async fn persist(&self) -> Result<(), PersistError> {
        let repo = self.storage.snapshots.as_ref();
        self.progress.save(repo).await?;
        self.reviews.save(repo).await?;
        Ok(())
    }

    /// Wipe all progress, reviews and the saved session, then persist the empty state.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if any write fails.
    pub async fn reset(&mut self) -> Result<(), PersistError> {
        self.cancel_advance();
        self.flow.exit();
        self.progress.reset_all_progress();
        self.progress.initialize_subject(&self.subject);
        self.reviews.clear();
        self.sessions.clear_session().await?;
        self.persist().await
    }

    /// Pretty JSON export of every word review record.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Encode` if serialisation fails.
    pub fn export_review_data(&self) -> Result<String, PersistError> {
        self.reviews.export_review_data()
    }

    /// Move every component's clock forward. Only affects fixed clocks.
    pub fn advance_clock(&mut self, delta: Duration) {
        self.clock.advance(delta);
        self.progress.advance_clock(delta);
        self.reviews.advance_clock(delta);
        self.sessions.advance_clock(delta);
    }

    async fn sync_session(&self) -> Result<(), PersistError> {
        match self.flow.plan() {
            Some(plan) if plan.mode() == SessionMode::Auto && plan.is_complete() => {
                self.sessions.clear_session().await
            }
            Some(plan) => self.sessions.save_session(plan).await,
            None => Ok(()),
        }
    }
}
