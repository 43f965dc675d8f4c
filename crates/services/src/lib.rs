#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod progress_store;
pub mod sessions;
pub mod word_review;

pub use literacy_core::Clock;
pub use sessions as session;

pub use config::EngineConfig;
pub use engine::{ActivityOutcome, LearnerEngine};
pub use error::{EngineError, FlowConfigError, PersistError, SessionError};
pub use progress_store::{ProgressStore, SubjectProgress};
pub use word_review::{ReviewExport, WordReviewScheduler};

pub use sessions::{
    AdvanceTimer, AutoFlowConfig, DEFAULT_ADVANCE_DELAY, FlowState, RecommendationPolicy,
    SessionFlow, SessionProgress, SessionStore,
};
