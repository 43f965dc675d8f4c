mod catalog;
mod ids;
mod progress;
mod review;
mod session;
mod values;

pub use catalog::{
    ContentCatalog, LessonRef, LetterProgression, StaticCatalog, UnitRef, VocabularyEntry,
};
pub use ids::{ItemId, LessonId, ParseIdError, SubjectId, UnitId};
pub use progress::{ActivityResult, GlobalState, ItemProgress, LessonProgress, UnitProgress};
pub use review::{BlendingStats, WordReviewRecord};
pub use session::{
    ActivityKind, SessionMode, SessionPlan, SessionPlanError, SessionStep, StepTarget,
};
pub use values::{AttemptNumber, Difficulty, Score, Smoothness, ValueError};
