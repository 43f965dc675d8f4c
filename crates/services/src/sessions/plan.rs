use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use literacy_core::model::{
    ActivityKind, SessionMode, SessionPlan, SessionPlanError, SessionStep, UnitId,
};

use super::progress::SessionProgress;
use crate::error::FlowConfigError;

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Shape of an auto-flow plan.
///
/// Defaults to 8 steps with a sentence-reading step every 4th position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AutoFlowFields")]
pub struct AutoFlowConfig {
    step_count: usize,
    narrative_every: usize,
}

impl AutoFlowConfig {
    /// # Errors
    ///
    /// Returns `FlowConfigError` for zero steps or a narrative cadence below 2
    /// (which would leave no room for word steps).
    pub fn new(step_count: usize, narrative_every: usize) -> Result<Self, FlowConfigError> {
        if step_count == 0 {
            return Err(FlowConfigError::ZeroSteps);
        }
        if narrative_every < 2 {
            return Err(FlowConfigError::InvalidNarrativeCadence(narrative_every));
        }
        Ok(Self {
            step_count,
            narrative_every,
        })
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    #[must_use]
    pub fn narrative_every(&self) -> usize {
        self.narrative_every
    }

    /// Whether the 0-based `position` is a sentence-reading step.
    #[must_use]
    pub fn is_narrative_position(&self, position: usize) -> bool {
        (position + 1) % self.narrative_every == 0
    }

    /// Number of words a full plan consumes.
    #[must_use]
    pub fn word_steps(&self) -> usize {
        self.step_count - self.step_count / self.narrative_every
    }
}

#[derive(Deserialize)]
struct AutoFlowFields {
    step_count: usize,
    narrative_every: usize,
}

impl TryFrom<AutoFlowFields> for AutoFlowConfig {
    type Error = FlowConfigError;

    fn try_from(f: AutoFlowFields) -> Result<Self, Self::Error> {
        Self::new(f.step_count, f.narrative_every)
    }
}

impl Default for AutoFlowConfig {
    fn default() -> Self {
        Self {
            step_count: 8,
            narrative_every: 4,
        }
    }
}

/// When to suggest learner-directed sessions instead of guided ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationPolicy {
    pub min_completed_units: usize,
    pub min_total_reviews: u64,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            min_completed_units: 2,
            min_total_reviews: 30,
        }
    }
}

//
// ─── BUILDERS ──────────────────────────────────────────────────────────────────
//

/// Build a guided plan from `words`, consumed in order.
///
/// Word steps rotate through [`ActivityKind::WORD_ROTATION`]; every
/// `narrative_every`-th step reads a sentence instead. When the words run out
/// the plan ends at that point, so it may be shorter than `step_count`.
///
/// # Errors
///
/// Propagates `SessionPlanError` from plan validation.
pub fn create_auto_flow_session(
    unit: UnitId,
    words: &[String],
    config: &AutoFlowConfig,
    created_at: DateTime<Utc>,
) -> Result<SessionPlan, SessionPlanError> {
    let mut steps = Vec::with_capacity(config.step_count());
    let mut words = words.iter();
    let mut rotation = ActivityKind::WORD_ROTATION.iter().cycle();

    for position in 0..config.step_count() {
        if config.is_narrative_position(position) {
            steps.push(SessionStep::sentence());
            continue;
        }
        let (Some(word), Some(activity)) = (words.next(), rotation.next()) else {
            break;
        };
        steps.push(SessionStep::word(*activity, word.clone()));
    }

    tracing::info!(%unit, steps = steps.len(), "built auto-flow session");
    SessionPlan::new(SessionMode::Auto, unit, steps, created_at)
}

/// Empty learner-directed plan; activities are appended as they are played.
///
/// # Errors
///
/// Propagates `SessionPlanError` from plan validation.
pub fn create_menu_mode_session(
    unit: UnitId,
    created_at: DateTime<Utc>,
) -> Result<SessionPlan, SessionPlanError> {
    tracing::info!(%unit, "started menu-mode session");
    SessionPlan::new(SessionMode::Menu, unit, Vec::new(), created_at)
}

//
// ─── PURE OPERATIONS ───────────────────────────────────────────────────────────
//

/// The step at the cursor; always `None` for menu plans.
#[must_use]
pub fn get_next_step(plan: &SessionPlan) -> Option<&SessionStep> {
    match plan.mode() {
        SessionMode::Auto => plan.current_step(),
        SessionMode::Menu => None,
    }
}

/// New plan with the cursor moved forward; the input is left untouched.
#[must_use]
pub fn advance_step(plan: &SessionPlan) -> SessionPlan {
    plan.advanced()
}

#[must_use]
pub fn get_session_progress(plan: &SessionPlan) -> SessionProgress {
    SessionProgress::of(plan)
}

#[must_use]
pub fn is_session_complete(plan: &SessionPlan) -> bool {
    plan.is_complete()
}

/// Guided sessions until the learner has enough history to self-direct.
#[must_use]
pub fn get_recommended_mode(
    completed_units: usize,
    total_reviews: u64,
    policy: &RecommendationPolicy,
) -> SessionMode {
    if completed_units >= policy.min_completed_units && total_reviews >= policy.min_total_reviews {
        SessionMode::Menu
    } else {
        SessionMode::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use literacy_core::model::StepTarget;
    use literacy_core::time::fixed_now;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn auto_plan_rotates_and_inserts_sentences() {
        let plan = create_auto_flow_session(
            UnitId::new(2),
            &words(10),
            &AutoFlowConfig::default(),
            fixed_now(),
        )
        .unwrap();

        let kinds: Vec<ActivityKind> = plan.steps().iter().map(|s| s.activity).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::SoundOut,
                ActivityKind::BuildWord,
                ActivityKind::PictureMatch,
                ActivityKind::ReadSentence,
                ActivityKind::SoundOut,
                ActivityKind::BuildWord,
                ActivityKind::PictureMatch,
                ActivityKind::ReadSentence,
            ]
        );
        let used: Vec<&str> = plan.steps().iter().filter_map(SessionStep::word_text).collect();
        assert_eq!(used, vec!["w0", "w1", "w2", "w3", "w4", "w5"]);
        assert_eq!(plan.steps()[3].target, StepTarget::Sentence);
    }

    #[test]
    fn auto_plan_stops_when_words_run_out() {
        let plan = create_auto_flow_session(
            UnitId::new(1),
            &words(4),
            &AutoFlowConfig::default(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(plan.steps().len(), 5);
        assert_eq!(plan.steps()[4].word_text(), Some("w3"));

        let empty =
            create_auto_flow_session(UnitId::new(1), &[], &AutoFlowConfig::default(), fixed_now())
                .unwrap();
        assert!(is_session_complete(&empty));
    }

    #[test]
    fn advance_is_pure_and_tracks_progress() {
        let plan = create_auto_flow_session(
            UnitId::new(1),
            &words(6),
            &AutoFlowConfig::default(),
            fixed_now(),
        )
        .unwrap();
        let next = advance_step(&plan);
        assert_eq!(plan.current_step_index(), 0);
        assert_eq!(next.current_step_index(), 1);

        let progress = get_session_progress(&next);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 8);
        assert!((progress.percentage - 12.5).abs() < f64::EPSILON);

        let mut done = next;
        while !is_session_complete(&done) {
            done = advance_step(&done);
        }
        assert!(get_next_step(&done).is_none());
        assert_eq!(get_session_progress(&done).remaining(), 0);
    }

    #[test]
    fn menu_plan_has_no_next_step() {
        let plan = create_menu_mode_session(UnitId::new(1), fixed_now()).unwrap();
        assert_eq!(plan.mode(), SessionMode::Menu);
        assert!(get_next_step(&plan).is_none());
    }

    #[test]
    fn recommendation_needs_units_and_reviews() {
        let policy = RecommendationPolicy::default();
        assert_eq!(get_recommended_mode(0, 0, &policy), SessionMode::Auto);
        assert_eq!(get_recommended_mode(2, 29, &policy), SessionMode::Auto);
        assert_eq!(get_recommended_mode(1, 100, &policy), SessionMode::Auto);
        assert_eq!(get_recommended_mode(2, 30, &policy), SessionMode::Menu);
    }

    #[test]
    fn config_validation() {
        assert_eq!(AutoFlowConfig::new(0, 4), Err(FlowConfigError::ZeroSteps));
        assert_eq!(
            AutoFlowConfig::new(8, 1),
            Err(FlowConfigError::InvalidNarrativeCadence(1))
        );
        let cfg = AutoFlowConfig::new(12, 3).unwrap();
        assert_eq!(cfg.word_steps(), 8);
    }

    #[test]
    fn deserialising_rejects_zero_cadence() {
        let err = serde_json::from_str::<AutoFlowConfig>(r#"{"step_count":8,"narrative_every":0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("cadence"));

        let cfg: AutoFlowConfig =
            serde_json::from_str(r#"{"step_count":6,"narrative_every":3}"#).unwrap();
        assert_eq!(cfg, AutoFlowConfig::new(6, 3).unwrap());
    }
}
