use serde::{Deserialize, Serialize};

use literacy_core::mastery::MasteryConfig;
use literacy_core::scheduler::ReviewScheduleConfig;

use crate::sessions::{AutoFlowConfig, RecommendationPolicy};

/// Every tunable of the engine in one place.
///
/// Each part is validated by its own constructor; `Default` gives the
/// standard curriculum settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mastery: MasteryConfig,
    pub review: ReviewScheduleConfig,
    pub auto_flow: AutoFlowConfig,
    pub recommendation: RecommendationPolicy,
}

impl EngineConfig {
    #[must_use]
    pub fn with_mastery(mut self, mastery: MasteryConfig) -> Self {
        self.mastery = mastery;
        self
    }

    #[must_use]
    pub fn with_review(mut self, review: ReviewScheduleConfig) -> Self {
        self.review = review;
        self
    }

    #[must_use]
    pub fn with_auto_flow(mut self, auto_flow: AutoFlowConfig) -> Self {
        self.auto_flow = auto_flow;
        self
    }

    #[must_use]
    pub fn with_recommendation(mut self, recommendation: RecommendationPolicy) -> Self {
        self.recommendation = recommendation;
        self
    }
}
