use chrono::{DateTime, Utc};

use literacy_core::model::{
    ActivityKind, ContentCatalog, SessionMode, SessionPlan, SessionStep, StepTarget, UnitId,
};

use super::plan::{AutoFlowConfig, advance_step, create_auto_flow_session, create_menu_mode_session};
use super::progress::SessionProgress;
use crate::error::SessionError;
use crate::word_review::WordReviewScheduler;

/// Where the learner is in the session lifecycle.
///
/// `ModeSelection` is initial. Auto sessions go `Running -> Complete`; menu
/// sessions alternate `Hub <-> ActivityInProgress` until the learner exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    ModeSelection,
    Running,
    Complete,
    Hub,
    ActivityInProgress,
}

/// Drives one learner's session plan through its states.
#[derive(Debug, Clone)]
pub struct SessionFlow {
    state: FlowState,
    plan: Option<SessionPlan>,
    active: Option<SessionStep>,
    config: AutoFlowConfig,
}

impl SessionFlow {
    #[must_use]
    pub fn new(config: AutoFlowConfig) -> Self {
        Self {
            state: FlowState::ModeSelection,
            plan: None,
            active: None,
            config,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state
    }

    #[must_use]
    pub fn plan(&self) -> Option<&SessionPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.plan.as_ref().map(SessionProgress::of)
    }

    /// The activity the learner is currently playing, if any.
    #[must_use]
    pub fn current_activity(&self) -> Option<&SessionStep> {
        match self.state {
            FlowState::Running => self.plan.as_ref().and_then(SessionPlan::current_step),
            FlowState::ActivityInProgress => self.active.as_ref(),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.state {
            FlowState::ModeSelection | FlowState::Complete => Ok(()),
            _ => Err(SessionError::AlreadyActive),
        }
    }

    /// Continue a previously saved plan.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyActive` if a session is running.
    pub fn resume(&mut self, plan: SessionPlan) -> Result<FlowState, SessionError> {
        self.ensure_idle()?;
        self.state = match plan.mode() {
            SessionMode::Auto if plan.is_complete() => FlowState::Complete,
            SessionMode::Auto => FlowState::Running,
            SessionMode::Menu => FlowState::Hub,
        };
        tracing::info!(plan_id = %plan.id(), state = ?self.state, "resumed session");
        self.plan = Some(plan);
        self.active = None;
        Ok(self.state)
    }

    /// Start a guided session with words drawn from the review scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyActive` if a session is running.
    pub fn start_auto(
        &mut self,
        unit: UnitId,
        reviews: &WordReviewScheduler,
        catalog: &dyn ContentCatalog,
        now: DateTime<Utc>,
    ) -> Result<&SessionPlan, SessionError> {
        self.ensure_idle()?;
        let available = catalog.words_up_to(unit);
        let words = reviews.get_session_words(&available, unit, self.config.word_steps());
        let plan = create_auto_flow_session(unit, &words, &self.config, now)?;
        self.state = if plan.is_complete() {
            FlowState::Complete
        } else {
            FlowState::Running
        };
        self.active = None;
        Ok(self.plan.insert(plan))
    }

    /// Open the activity hub for a learner-directed session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyActive` if a session is running.
    pub fn start_menu(&mut self, unit: UnitId, now: DateTime<Utc>) -> Result<&SessionPlan, SessionError> {
        self.ensure_idle()?;
        let plan = create_menu_mode_session(unit, now)?;
        self.state = FlowState::Hub;
        self.active = None;
        Ok(self.plan.insert(plan))
    }

    /// Next playable step of a guided session.
    ///
    /// Steps the catalog can no longer supply (a sentence for a unit without
    /// sentences, a word dropped from the vocabulary) are skipped. Returns
    /// `None` once the plan is finished.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAutoFlow` in menu mode and
    /// `SessionError::NoActiveSession` before a session starts.
    pub fn next_step(
        &mut self,
        catalog: &dyn ContentCatalog,
    ) -> Result<Option<SessionStep>, SessionError> {
        match self.state {
            FlowState::Running => {}
            FlowState::Complete => return Ok(None),
            FlowState::Hub | FlowState::ActivityInProgress => return Err(SessionError::NotAutoFlow),
            FlowState::ModeSelection => return Err(SessionError::NoActiveSession),
        }
        let plan = self.plan.as_mut().ok_or(SessionError::NoActiveSession)?;

        loop {
            let Some(step) = plan.current_step() else {
                self.state = FlowState::Complete;
                tracing::info!(plan_id = %plan.id(), "auto-flow session complete");
                return Ok(None);
            };
            if is_supplied(step, plan.unit(), catalog) {
                return Ok(Some(step.clone()));
            }
            tracing::info!(
                activity = %step.activity,
                index = plan.current_step_index(),
                "skipping step without content"
            );
            *plan = advance_step(plan);
        }
    }

    /// Mark the current activity finished.
    ///
    /// Guided sessions move the cursor forward; menu sessions record the
    /// activity in the plan history and return to the hub.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when no activity is being played.
    pub fn complete_step(&mut self) -> Result<&SessionPlan, SessionError> {
        let plan = self.plan.as_mut().ok_or(SessionError::NoActiveSession)?;
        match self.state {
            FlowState::Running => {
                *plan = advance_step(plan);
                if plan.is_complete() {
                    self.state = FlowState::Complete;
                    tracing::info!(plan_id = %plan.id(), "auto-flow session complete");
                }
            }
            FlowState::ActivityInProgress => {
                let step = self.active.take().ok_or(SessionError::NoActivityInProgress)?;
                plan.push_completed(step)?;
                self.state = FlowState::Hub;
            }
            FlowState::Hub => return Err(SessionError::NoActivityInProgress),
            FlowState::Complete | FlowState::ModeSelection => {
                return Err(SessionError::NoActiveSession);
            }
        }
        Ok(plan)
    }

    /// Pick content for `kind` on demand in a menu session.
    ///
    /// Word activities take the top word from the review scheduler; sentence
    /// reading needs the catalog to have a sentence for the unit. Returns
    /// `None`, staying in the hub, when nothing is available.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotMenuMode` outside the hub, or
    /// `SessionError::ActivityInProgress` if one is already being played.
    pub fn request_activity(
        &mut self,
        kind: ActivityKind,
        reviews: &WordReviewScheduler,
        catalog: &dyn ContentCatalog,
    ) -> Result<Option<SessionStep>, SessionError> {
        match self.state {
            FlowState::Hub => {}
            FlowState::ActivityInProgress => return Err(SessionError::ActivityInProgress),
            _ => return Err(SessionError::NotMenuMode),
        }
        let unit = self
            .plan
            .as_ref()
            .map(SessionPlan::unit)
            .ok_or(SessionError::NoActiveSession)?;

        let step = if kind.is_narrative() {
            catalog.has_sentences(unit).then(SessionStep::sentence)
        } else {
            let available = catalog.words_up_to(unit);
            reviews
                .get_session_words(&available, unit, 1)
                .into_iter()
                .next()
                .map(|word| SessionStep::word(kind, word))
        };

        match &step {
            Some(step) => {
                tracing::debug!(activity = %step.activity, "menu activity started");
                self.active = Some(step.clone());
                self.state = FlowState::ActivityInProgress;
            }
            None => tracing::info!(activity = %kind, %unit, "no content for requested activity"),
        }
        Ok(step)
    }

    /// Abandon the menu activity in progress and return to the hub.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActivityInProgress` if nothing is being played.
    pub fn cancel_activity(&mut self) -> Result<(), SessionError> {
        if self.state != FlowState::ActivityInProgress {
            return Err(SessionError::NoActivityInProgress);
        }
        self.active = None;
        self.state = FlowState::Hub;
        Ok(())
    }

    /// Leave the session and return to mode selection, handing back the plan.
    pub fn exit(&mut self) -> Option<SessionPlan> {
        self.state = FlowState::ModeSelection;
        self.active = None;
        self.plan.take()
    }
}

impl Default for SessionFlow {
    fn default() -> Self {
        Self::new(AutoFlowConfig::default())
    }
}

fn is_supplied(step: &SessionStep, unit: UnitId, catalog: &dyn ContentCatalog) -> bool {
    match &step.target {
        StepTarget::Sentence => catalog.has_sentences(unit),
        StepTarget::Word(word) => catalog.vocabulary().iter().any(|entry| &entry.word == word),
    }
}
