use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::model::UnitId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionPlanError {
    #[error("step index {index} is beyond the plan length {len}")]
    StepIndexOutOfRange { index: usize, len: usize },

    #[error("step {index} pairs its activity with the wrong kind of target")]
    TargetMismatch { index: usize },

    #[error("unknown activity kind: {0}")]
    UnknownActivity(String),
}

//
// ─── ACTIVITIES ────────────────────────────────────────────────────────────────
//

/// Closed set of practice activities a session can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Blend the sounds of a word aloud.
    SoundOut,
    /// Spell the word from letter tiles.
    BuildWord,
    /// Match the word to its picture.
    PictureMatch,
    /// Read a short decodable sentence.
    ReadSentence,
}

impl ActivityKind {
    /// Word activities in the order auto-flow sessions rotate through them.
    pub const WORD_ROTATION: [ActivityKind; 3] = [
        ActivityKind::SoundOut,
        ActivityKind::BuildWord,
        ActivityKind::PictureMatch,
    ];

    /// Narrative activities take a sentence, not a word.
    #[must_use]
    pub fn is_narrative(self) -> bool {
        matches!(self, ActivityKind::ReadSentence)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::SoundOut => "sound_out",
            ActivityKind::BuildWord => "build_word",
            ActivityKind::PictureMatch => "picture_match",
            ActivityKind::ReadSentence => "read_sentence",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = SessionPlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sound_out" => Ok(Self::SoundOut),
            "build_word" => Ok(Self::BuildWord),
            "picture_match" => Ok(Self::PictureMatch),
            "read_sentence" => Ok(Self::ReadSentence),
            other => Err(SessionPlanError::UnknownActivity(other.to_string())),
        }
    }
}

//
// ─── STEPS ─────────────────────────────────────────────────────────────────────
//

/// What a step practises: a specific word, or "some sentence for this unit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepTarget {
    Word(String),
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStep {
    pub activity: ActivityKind,
    pub target: StepTarget,
}

impl SessionStep {
    #[must_use]
    pub fn word(activity: ActivityKind, word: impl Into<String>) -> Self {
        Self {
            activity,
            target: StepTarget::Word(word.into()),
        }
    }

    #[must_use]
    pub fn sentence() -> Self {
        Self {
            activity: ActivityKind::ReadSentence,
            target: StepTarget::Sentence,
        }
    }

    #[must_use]
    pub fn word_text(&self) -> Option<&str> {
        match &self.target {
            StepTarget::Word(word) => Some(word),
            StepTarget::Sentence => None,
        }
    }

    fn is_well_formed(&self) -> bool {
        self.activity.is_narrative() == matches!(self.target, StepTarget::Sentence)
    }
}

//
// ─── PLAN ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Pre-planned sequence the learner is guided through.
    Auto,
    /// Learner picks each activity from a hub.
    Menu,
}

/// Ordered activities of one session plus a cursor.
///
/// `current_step_index == steps.len()` means the plan is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    id: Uuid,
    mode: SessionMode,
    unit: UnitId,
    steps: Vec<SessionStep>,
    current_step_index: usize,
    created_at: DateTime<Utc>,
}

impl SessionPlan {
    /// # Errors
    ///
    /// Returns `SessionPlanError::TargetMismatch` if a step pairs a narrative activity with a word
    /// (or a word activity with a sentence).
    pub fn new(
        mode: SessionMode,
        unit: UnitId,
        steps: Vec<SessionStep>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionPlanError> {
        Self::from_persisted(Uuid::new_v4(), mode, unit, steps, 0, created_at)
    }

    /// Rehydrate a plan from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionPlanError` if the cursor or any step is invalid.
    pub fn from_persisted(
        id: Uuid,
        mode: SessionMode,
        unit: UnitId,
        steps: Vec<SessionStep>,
        current_step_index: usize,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionPlanError> {
        let plan = Self {
            id,
            mode,
            unit,
            steps,
            current_step_index,
            created_at,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Re-check invariants, e.g. after deserialising.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), SessionPlanError> {
        if self.current_step_index > self.steps.len() {
            return Err(SessionPlanError::StepIndexOutOfRange {
                index: self.current_step_index,
                len: self.steps.len(),
            });
        }
        if let Some(index) = self.steps.iter().position(|s| !s.is_well_formed()) {
            return Err(SessionPlanError::TargetMismatch { index });
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    #[must_use]
    pub fn steps(&self) -> &[SessionStep] {
        &self.steps
    }

    #[must_use]
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&SessionStep> {
        self.steps.get(self.current_step_index)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_step_index == self.steps.len()
    }

    /// Copy of this plan with the cursor moved one step forward (saturating at the end).
    #[must_use]
    pub fn advanced(&self) -> Self {
        let mut next = self.clone();
        next.current_step_index = (self.current_step_index + 1).min(self.steps.len());
        next
    }

    /// Append a step that has already been played and move the cursor past it.
    ///
    /// Menu sessions use this to keep a history of on-demand activities.
    ///
    /// # Errors
    ///
    /// Returns `SessionPlanError::TargetMismatch` for a malformed step.
    pub fn push_completed(&mut self, step: SessionStep) -> Result<(), SessionPlanError> {
        if !step.is_well_formed() {
            return Err(SessionPlanError::TargetMismatch {
                index: self.steps.len(),
            });
        }
        self.steps.push(step);
        self.current_step_index = self.steps.len();
        Ok(())
    }
}
