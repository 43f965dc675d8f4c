use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Smoothness, UnitId, WordReviewRecord};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScheduleConfigError {
    #[error("shortest interval must be at least 1 day")]
    InvalidShortestInterval,
    #[error("maximum interval must be >= shortest interval")]
    InvalidIntervalBounds,
    #[error("growth factor must be finite and > 1, got {0}")]
    InvalidGrowthFactor(f64),
    #[error("mastery smoothness threshold must be in [0, 1], got {0}")]
    InvalidMasterySmoothness(f64),
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Interval growth and mastery thresholds for word reviews.
///
/// Defaults: failures come back after 1 day, each success doubles the previous
/// interval up to 30 days, and a word counts as blending-mastered after 3
/// reviews averaging at least 0.8 smoothness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReviewScheduleFields")]
pub struct ReviewScheduleConfig {
    shortest_interval_days: u32,
    growth_factor: f64,
    max_interval_days: u32,
    mastery_min_reviews: u32,
    mastery_min_smoothness: f64,
}

impl ReviewScheduleConfig {
    /// # Errors
    ///
    /// Returns `ScheduleConfigError` for a zero shortest interval, inverted bounds,
    /// a growth factor that does not grow, or a smoothness threshold outside `[0, 1]`.
    pub fn new(
        shortest_interval_days: u32,
        growth_factor: f64,
        max_interval_days: u32,
        mastery_min_reviews: u32,
        mastery_min_smoothness: f64,
    ) -> Result<Self, ScheduleConfigError> {
        if shortest_interval_days == 0 {
            return Err(ScheduleConfigError::InvalidShortestInterval);
        }
        if max_interval_days < shortest_interval_days {
            return Err(ScheduleConfigError::InvalidIntervalBounds);
        }
        if !growth_factor.is_finite() || growth_factor <= 1.0 {
            return Err(ScheduleConfigError::InvalidGrowthFactor(growth_factor));
        }
        if !(0.0..=1.0).contains(&mastery_min_smoothness) {
            return Err(ScheduleConfigError::InvalidMasterySmoothness(
                mastery_min_smoothness,
            ));
        }
        Ok(Self {
            shortest_interval_days,
            growth_factor,
            max_interval_days,
            mastery_min_reviews,
            mastery_min_smoothness,
        })
    }

    #[must_use]
    pub fn shortest_interval_days(&self) -> u32 {
        self.shortest_interval_days
    }

    #[must_use]
    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    #[must_use]
    pub fn max_interval_days(&self) -> u32 {
        self.max_interval_days
    }

    #[must_use]
    pub fn mastery_min_reviews(&self) -> u32 {
        self.mastery_min_reviews
    }

    #[must_use]
    pub fn mastery_min_smoothness(&self) -> f64 {
        self.mastery_min_smoothness
    }
}

#[derive(Deserialize)]
struct ReviewScheduleFields {
    shortest_interval_days: u32,
    growth_factor: f64,
    max_interval_days: u32,
    mastery_min_reviews: u32,
    mastery_min_smoothness: f64,
}

impl TryFrom<ReviewScheduleFields> for ReviewScheduleConfig {
    type Error = ScheduleConfigError;

    fn try_from(f: ReviewScheduleFields) -> Result<Self, Self::Error> {
        Self::new(
            f.shortest_interval_days,
            f.growth_factor,
            f.max_interval_days,
            f.mastery_min_reviews,
            f.mastery_min_smoothness,
        )
    }
}

impl Default for ReviewScheduleConfig {
    fn default() -> Self {
        Self {
            shortest_interval_days: 1,
            growth_factor: 2.0,
            max_interval_days: 30,
            mastery_min_reviews: 3,
            mastery_min_smoothness: 0.8,
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Outcome of applying one review to a word.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReview {
    pub record: WordReviewRecord,
    pub interval_days: u32,
    /// True only on the review that first earned `blending_mastered`.
    pub newly_mastered: bool,
}

/// Simplified SM-2 style scheduler for word reviews.
///
/// A success multiplies the previous interval by the growth factor (capped at
/// the maximum); a failure drops back to the shortest interval. A brand-new word
/// starts from the shortest interval, so its first success lands one growth
/// step later than its first failure would.
///
/// # Examples
///
/// ```
/// # use literacy_core::scheduler::ReviewScheduler;
/// # use literacy_core::model::{Smoothness, UnitId};
/// let scheduler = ReviewScheduler::default();
/// let now = chrono::Utc::now();
/// let applied = scheduler.apply_review(None, "cat", UnitId::new(1), Smoothness::clamped(0.9), true, now);
/// assert_eq!(applied.interval_days, 2);
/// assert_eq!(applied.record.review_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReviewScheduler {
    config: ReviewScheduleConfig,
}

impl ReviewScheduler {
    #[must_use]
    pub fn new(config: ReviewScheduleConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReviewScheduleConfig {
        &self.config
    }

    /// Interval (days) after a review, given the interval that preceded it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next_interval(&self, previous_days: u32, success: bool) -> u32 {
        let shortest = self.config.shortest_interval_days;
        if !success {
            return shortest;
        }
        let base = previous_days.max(shortest);
        let grown = (f64::from(base) * self.config.growth_factor).round();
        let capped = grown.min(f64::from(self.config.max_interval_days));
        (capped as u32).clamp(shortest, self.config.max_interval_days)
    }

    /// Fold a review into `existing` (or a fresh record) and reschedule it.
    ///
    /// The stored unit keeps the lowest unit the word was practised in.
    #[must_use]
    pub fn apply_review(
        &self,
        existing: Option<WordReviewRecord>,
        word: &str,
        unit: UnitId,
        smoothness: Smoothness,
        success: bool,
        reviewed_at: DateTime<Utc>,
    ) -> AppliedReview {
        let mut record =
            existing.unwrap_or_else(|| WordReviewRecord::unreviewed(word, unit, reviewed_at));
        if unit < record.unit() {
            record.set_unit(unit);
        }

        let previous_interval = record.interval_days();
        record.record_outcome(smoothness, success, reviewed_at);

        let interval_days = self.next_interval(previous_interval, success);
        record.reschedule(interval_days, reviewed_at);

        let was_mastered = record.blending_mastered();
        if !was_mastered && self.meets_mastery(&record) {
            record.mark_mastered();
        }

        AppliedReview {
            newly_mastered: !was_mastered && record.blending_mastered(),
            record,
            interval_days,
        }
    }

    /// Review count and average smoothness both at threshold.
    #[must_use]
    pub fn meets_mastery(&self, record: &WordReviewRecord) -> bool {
        record.review_count() >= self.config.mastery_min_reviews
            && record.avg_smoothness() >= self.config.mastery_min_smoothness
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
