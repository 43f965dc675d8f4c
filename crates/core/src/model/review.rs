use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Smoothness, UnitId};

//
// ─── WORD REVIEW RECORD ───────────────────────────────────────────────────────
//

/// Spaced-repetition history for one vocabulary word.
///
/// Created on the first review and updated by `ReviewScheduler::apply_review`.
/// `blending_mastered` is sticky: once earned it is never cleared, but later
/// failures still lower the average and pull `next_due_at` back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordReviewRecord {
    word: String,
    unit: UnitId,
    review_count: u32,
    success_count: u32,
    failure_count: u32,
    avg_smoothness: f64,
    blending_mastered: bool,
    last_reviewed_at: Option<DateTime<Utc>>,
    next_due_at: DateTime<Utc>,
    #[serde(default)]
    interval_days: u32,
}

impl WordReviewRecord {
    /// A record for a word that has been introduced but never reviewed.
    #[must_use]
    pub fn unreviewed(word: impl Into<String>, unit: UnitId, created_at: DateTime<Utc>) -> Self {
        Self {
            word: word.into(),
            unit,
            review_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_smoothness: 0.0,
            blending_mastered: false,
            last_reviewed_at: None,
            next_due_at: created_at,
            interval_days: 0,
        }
    }

    /// Fold one review into the counters and the running smoothness mean.
    pub(crate) fn record_outcome(
        &mut self,
        smoothness: Smoothness,
        success: bool,
        reviewed_at: DateTime<Utc>,
    ) {
        self.review_count = self.review_count.saturating_add(1);
        if success {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        let n = f64::from(self.review_count);
        let mean = self.avg_smoothness + (smoothness.value() - self.avg_smoothness) / n;
        self.avg_smoothness = mean.clamp(0.0, 1.0);
        self.last_reviewed_at = Some(reviewed_at);
    }

    pub(crate) fn reschedule(&mut self, interval_days: u32, reviewed_at: DateTime<Utc>) {
        self.interval_days = interval_days;
        self.next_due_at = reviewed_at + Duration::days(i64::from(interval_days));
    }

    pub(crate) fn mark_mastered(&mut self) {
        self.blending_mastered = true;
    }

    pub(crate) fn set_unit(&mut self, unit: UnitId) {
        self.unit = unit;
    }

    #[must_use]
    pub fn word(&self) -> &str {
        &self.word
    }

    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    #[must_use]
    pub fn review_count(&self) -> u32 {
        self.review_count
    }

    #[must_use]
    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn avg_smoothness(&self) -> f64 {
        self.avg_smoothness
    }

    #[must_use]
    pub fn blending_mastered(&self) -> bool {
        self.blending_mastered
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn next_due_at(&self) -> DateTime<Utc> {
        self.next_due_at
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    /// Reviewed at least once and past its due date. Unreviewed words are never due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.review_count > 0 && self.next_due_at <= now
    }

    /// How far past due the word is; zero when not due.
    #[must_use]
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        if self.is_due(now) {
            now - self.next_due_at
        } else {
            Duration::zero()
        }
    }

    /// Checks invariants on a rehydrated record.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let counts_match =
            u64::from(self.success_count) + u64::from(self.failure_count) == u64::from(self.review_count);
        let due_after_review = self
            .last_reviewed_at
            .is_none_or(|last| self.next_due_at >= last);
        counts_match
            && due_after_review
            && self.avg_smoothness.is_finite()
            && (0.0..=1.0).contains(&self.avg_smoothness)
            && !self.word.is_empty()
    }
}

//
// ─── AGGREGATES ───────────────────────────────────────────────────────────────
//

/// Blending progress across all reviewed words up to a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlendingStats {
    pub total_words: usize,
    pub mastered_words: usize,
    pub in_progress_words: usize,
    pub total_reviews: u64,
    pub avg_smoothness: f64,
}

impl BlendingStats {
    /// Aggregate over `records`; `avg_smoothness` is the mean of per-word averages.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a WordReviewRecord>) -> Self {
        let mut stats = Self::default();
        let mut smoothness_sum = 0.0;
        for record in records {
            stats.total_words += 1;
            if record.blending_mastered() {
                stats.mastered_words += 1;
            } else {
                stats.in_progress_words += 1;
            }
            stats.total_reviews += u64::from(record.review_count());
            smoothness_sum += record.avg_smoothness();
        }
        if stats.total_words > 0 {
            stats.avg_smoothness = smoothness_sum / stats.total_words as f64;
        }
        stats
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
