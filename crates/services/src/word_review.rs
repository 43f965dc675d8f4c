use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use literacy_core::Clock;
use literacy_core::model::{
    BlendingStats, LetterProgression, Smoothness, UnitId, VocabularyEntry, WordReviewRecord,
};
use literacy_core::scheduler::{AppliedReview, ReviewScheduleConfig, ReviewScheduler};
use storage::repository::{SnapshotKey, SnapshotRepository};

use crate::error::PersistError;
use crate::persistence::{WORD_REVIEWS_SCHEMA_VERSION, load_snapshot, save_snapshot};

/// Self-contained backup of every review record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<WordReviewRecord>,
}

//
// ─── SCHEDULER SERVICE ─────────────────────────────────────────────────────────
//

/// Spaced-repetition ledger for vocabulary words, keyed by word.
///
/// Independent of [`crate::ProgressStore`]: review cadence is measured in days,
/// lesson mastery within a session.
#[derive(Debug, Clone)]
pub struct WordReviewScheduler {
    records: BTreeMap<String, WordReviewRecord>,
    scheduler: ReviewScheduler,
    letters: Option<LetterProgression>,
    clock: Clock,
}

impl WordReviewScheduler {
    #[must_use]
    pub fn new(config: ReviewScheduleConfig, clock: Clock) -> Self {
        Self {
            records: BTreeMap::new(),
            scheduler: ReviewScheduler::new(config),
            letters: None,
            clock,
        }
    }

    /// Restrict never-reviewed words to those decodable with the unlocked letters.
    #[must_use]
    pub fn with_letter_progression(mut self, letters: LetterProgression) -> Self {
        self.set_letter_progression(letters);
        self
    }

    pub fn set_letter_progression(&mut self, letters: LetterProgression) {
        self.letters = Some(letters);
    }

    #[must_use]
    pub fn config(&self) -> &ReviewScheduleConfig {
        self.scheduler.config()
    }

    /// Record one review of `word` at the clock's current time.
    pub fn record_review(
        &mut self,
        word: &str,
        unit: UnitId,
        smoothness: Smoothness,
        success: bool,
    ) -> AppliedReview {
        let now = self.clock.now();
        let existing = self.records.remove(word);
        let applied = self
            .scheduler
            .apply_review(existing, word, unit, smoothness, success, now);
        self.records
            .insert(word.to_owned(), applied.record.clone());

        tracing::debug!(
            word,
            success,
            smoothness = smoothness.value(),
            reviews = applied.record.review_count(),
            interval_days = applied.interval_days,
            "recorded word review"
        );
        if applied.newly_mastered {
            tracing::info!(word, "word blending mastered");
        }
        applied
    }

    /// Pick up to `count` words for a session, in catalog order for new words.
    ///
    /// See [`Self::get_session_words_with_rng`] for the selection rules.
    #[must_use]
    pub fn get_session_words(
        &self,
        available: &[VocabularyEntry],
        unit: UnitId,
        count: usize,
    ) -> Vec<String> {
        self.select_words(available, unit, count, None::<&mut rand::rngs::StdRng>)
    }

    /// Pick up to `count` words, shuffling the new-word pool with `rng`.
    ///
    /// Priority: due and not yet mastered (most overdue first), then never
    /// reviewed words decodable at `unit`, then mastered words (least recently
    /// reviewed first). No word repeats; a short list is a valid result.
    #[must_use]
    pub fn get_session_words_with_rng<R: Rng + ?Sized>(
        &self,
        available: &[VocabularyEntry],
        unit: UnitId,
        count: usize,
        rng: &mut R,
    ) -> Vec<String> {
        self.select_words(available, unit, count, Some(rng))
    }

    fn select_words<R: Rng + ?Sized>(
        &self,
        available: &[VocabularyEntry],
        unit: UnitId,
        count: usize,
        rng: Option<&mut R>,
    ) -> Vec<String> {
        let now = self.clock.now();
        let mut selected: Vec<String> = Vec::with_capacity(count);
        let mut seen: HashSet<&str> = HashSet::new();

        let mut due: Vec<&WordReviewRecord> = self
            .records
            .values()
            .filter(|r| r.is_due(now) && !r.blending_mastered())
            .collect();
        due.sort_by(|a, b| {
            a.next_due_at()
                .cmp(&b.next_due_at())
                .then_with(|| a.word().cmp(b.word()))
        });

        let mut fresh: Vec<&VocabularyEntry> = available
            .iter()
            .filter(|entry| entry.min_unit <= unit)
            .filter(|entry| {
                self.records
                    .get(&entry.word)
                    .is_none_or(|r| r.review_count() == 0)
            })
            .filter(|entry| {
                self.letters
                    .as_ref()
                    .is_none_or(|letters| letters.is_decodable(&entry.word, unit))
            })
            .collect();
        if let Some(rng) = rng {
            fresh.shuffle(rng);
        }

        let mut mastered: Vec<&WordReviewRecord> = self
            .records
            .values()
            .filter(|r| r.blending_mastered())
            .collect();
        mastered.sort_by(|a, b| {
            a.last_reviewed_at()
                .cmp(&b.last_reviewed_at())
                .then_with(|| a.word().cmp(b.word()))
        });

        let candidates = due
            .into_iter()
            .map(WordReviewRecord::word)
            .chain(fresh.into_iter().map(|entry| entry.word.as_str()))
            .chain(mastered.into_iter().map(WordReviewRecord::word));

        for word in candidates {
            if selected.len() >= count {
                break;
            }
            if seen.insert(word) {
                selected.push(word.to_owned());
            }
        }

        tracing::debug!(
            requested = count,
            selected = selected.len(),
            %unit,
            "selected session words"
        );
        selected
    }

    #[must_use]
    pub fn get_all_word_reviews(&self) -> &BTreeMap<String, WordReviewRecord> {
        &self.records
    }

    #[must_use]
    pub fn get_word_review(&self, word: &str) -> Option<&WordReviewRecord> {
        self.records.get(word)
    }

    /// Aggregate over words first practised at or below `max_unit`.
    #[must_use]
    pub fn get_overall_blending_stats(&self, max_unit: UnitId) -> BlendingStats {
        BlendingStats::from_records(self.records.values().filter(|r| r.unit() <= max_unit))
    }

    /// Words due at `now` that are not yet mastered.
    #[must_use]
    pub fn due_count(&self, now: DateTime<Utc>) -> usize {
        self.records
            .values()
            .filter(|r| r.is_due(now) && !r.blending_mastered())
            .count()
    }

    /// Sum of review counts across every word.
    #[must_use]
    pub fn total_reviews(&self) -> u64 {
        self.records
            .values()
            .map(|r| u64::from(r.review_count()))
            .sum()
    }

    /// Pretty JSON snapshot of every record, for the caller to write out.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Encode` if serialisation fails.
    pub fn export_review_data(&self) -> Result<String, PersistError> {
        let export = ReviewExport {
            schema_version: WORD_REVIEWS_SCHEMA_VERSION,
            exported_at: self.clock.now(),
            records: self.records.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        tracing::info!("word reviews cleared");
    }

    /// Restore from the snapshot, or start empty if none is usable.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Storage` if the backend cannot be read.
    pub async fn load(
        repo: &dyn SnapshotRepository,
        config: ReviewScheduleConfig,
        clock: Clock,
    ) -> Result<Self, PersistError> {
        let mut scheduler = Self::new(config, clock);
        let snapshot: Option<BTreeMap<String, WordReviewRecord>> =
            load_snapshot(repo, SnapshotKey::WordReviews, WORD_REVIEWS_SCHEMA_VERSION).await?;
        if let Some(records) = snapshot {
            if records
                .iter()
                .all(|(word, record)| word == record.word() && record.is_consistent())
            {
                tracing::info!(words = records.len(), "restored word reviews");
                scheduler.records = records;
            } else {
                tracing::warn!("discarding word review snapshot that violates invariants");
            }
        }
        Ok(scheduler)
    }

    /// Write every record as one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if encoding or the write fails.
    pub async fn save(&self, repo: &dyn SnapshotRepository) -> Result<(), PersistError> {
        save_snapshot(
            repo,
            SnapshotKey::WordReviews,
            WORD_REVIEWS_SCHEMA_VERSION,
            &self.records,
            self.clock.now(),
        )
        .await
    }

    /// Move the scheduler's clock, for tests and simulations on a fixed clock.
    pub fn advance_clock(&mut self, delta: chrono::Duration) {
        self.clock.advance(delta);
    }
}

impl Default for WordReviewScheduler {
    fn default() -> Self {
        Self::new(ReviewScheduleConfig::default(), Clock::default())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use literacy_core::model::Difficulty;
    use literacy_core::time::{fixed_clock, fixed_now};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storage::repository::{InMemoryRepository, SnapshotRecord};

    fn vocab(words: &[&str], unit: u32) -> Vec<VocabularyEntry> {
        words
            .iter()
            .map(|w| VocabularyEntry::new(*w, UnitId::new(unit), Difficulty::EASIEST))
            .collect()
    }

    fn smooth(v: f64) -> Smoothness {
        Smoothness::new(v).unwrap()
    }

    fn scheduler() -> WordReviewScheduler {
        WordReviewScheduler::new(ReviewScheduleConfig::default(), fixed_clock())
    }

    #[test]
    fn cat_is_mastered_after_three_smooth_reviews() {
        let mut s = scheduler();
        for score in [0.9, 0.85, 0.95] {
            s.record_review("cat", UnitId::new(1), smooth(score), true);
        }
        let cat = s.get_word_review("cat").unwrap();
        assert_eq!(cat.review_count(), 3);
        assert!(cat.blending_mastered());
        assert!((cat.avg_smoothness() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn failed_word_is_due_sooner() {
        let mut s = scheduler();
        s.record_review("dog", UnitId::new(1), smooth(0.3), false);
        s.record_review("sun", UnitId::new(1), smooth(0.9), true);
        let dog = s.get_word_review("dog").unwrap();
        let sun = s.get_word_review("sun").unwrap();
        assert!(!dog.blending_mastered());
        assert!(dog.next_due_at() < sun.next_due_at());
    }

    #[test]
    fn overdue_word_comes_first() {
        let mut s = scheduler();
        s.record_review("cat", UnitId::new(1), smooth(0.4), false);
        s.advance_clock(Duration::days(3));

        let words = s.get_session_words(&vocab(&["cat", "dog", "sun"], 1), UnitId::new(3), 2);
        assert_eq!(words, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn most_overdue_first_then_new_then_mastered() {
        let mut s = scheduler();
        for _ in 0..3 {
            s.record_review("map", UnitId::new(1), smooth(1.0), true);
        }
        s.record_review("pig", UnitId::new(1), smooth(0.2), false);
        s.advance_clock(Duration::days(1));
        s.record_review("hat", UnitId::new(1), smooth(0.2), false);
        s.advance_clock(Duration::days(5));

        let available = vocab(&["hat", "pig", "map", "fan"], 1);
        let words = s.get_session_words(&available, UnitId::new(1), 10);
        assert_eq!(words, vec!["pig", "hat", "fan", "map"]);
    }

    #[test]
    fn unreviewed_words_are_never_due() {
        let s = scheduler();
        assert_eq!(s.due_count(fixed_now() + Duration::days(100)), 0);
    }

    #[test]
    fn new_words_respect_unit_and_letters() {
        let letters = LetterProgression::new()
            .with_unit(UnitId::new(1), "satp")
            .with_unit(UnitId::new(2), "inmd");
        let s = scheduler().with_letter_progression(letters);

        let mut available = vocab(&["sat", "pin", "map"], 1);
        available.push(VocabularyEntry::new("tap", UnitId::new(4), Difficulty::EASIEST));

        let words = s.get_session_words(&available, UnitId::new(1), 5);
        assert_eq!(words, vec!["sat"]);
        let words = s.get_session_words(&available, UnitId::new(2), 5);
        assert_eq!(words, vec!["sat", "pin", "map"]);
    }

    #[test]
    fn short_pool_returns_everything_once() {
        let s = scheduler();
        let mut available = vocab(&["cat", "dog"], 1);
        available.extend(vocab(&["cat"], 1));
        let words = s.get_session_words(&available, UnitId::new(1), 5);
        assert_eq!(words, vec!["cat", "dog"]);
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let s = scheduler();
        let available = vocab(&["a", "b", "c", "d", "e", "f"], 1);
        let first = s.get_session_words_with_rng(
            &available,
            UnitId::new(1),
            6,
            &mut StdRng::seed_from_u64(7),
        );
        let second = s.get_session_words_with_rng(
            &available,
            UnitId::new(1),
            6,
            &mut StdRng::seed_from_u64(7),
        );
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn stats_filter_by_unit() {
        let mut s = scheduler();
        for _ in 0..3 {
            s.record_review("cat", UnitId::new(1), smooth(0.9), true);
        }
        s.record_review("ship", UnitId::new(4), smooth(0.5), true);

        let early = s.get_overall_blending_stats(UnitId::new(2));
        assert_eq!(early.total_words, 1);
        assert_eq!(early.mastered_words, 1);

        let all = s.get_overall_blending_stats(UnitId::new(9));
        assert_eq!(all.total_words, 2);
        assert_eq!(all.in_progress_words, 1);
        assert_eq!(all.total_reviews, 4);
        assert_eq!(s.total_reviews(), 4);
    }

    #[test]
    fn export_is_pure_and_parseable() {
        let mut s = scheduler();
        s.record_review("cat", UnitId::new(1), smooth(0.7), true);
        let before = s.get_all_word_reviews().clone();

        let json = s.export_review_data().unwrap();
        let export: ReviewExport = serde_json::from_str(&json).unwrap();
        assert_eq!(export.schema_version, WORD_REVIEWS_SCHEMA_VERSION);
        assert_eq!(export.records.len(), 1);
        assert_eq!(s.get_all_word_reviews(), &before);
    }

    #[tokio::test]
    async fn persists_and_rejects_stale_versions() {
        let repo = InMemoryRepository::new();
        let mut s = scheduler();
        s.record_review("cat", UnitId::new(1), smooth(0.7), true);
        s.save(&repo).await.unwrap();

        let loaded = WordReviewScheduler::load(&repo, ReviewScheduleConfig::default(), fixed_clock())
            .await
            .unwrap();
        assert_eq!(loaded.get_all_word_reviews(), s.get_all_word_reviews());

        repo.save(&SnapshotRecord::new(
            SnapshotKey::WordReviews,
            WORD_REVIEWS_SCHEMA_VERSION + 1,
            "{}",
            fixed_now(),
        ))
        .await
        .unwrap();
        let stale = WordReviewScheduler::load(&repo, ReviewScheduleConfig::default(), fixed_clock())
            .await
            .unwrap();
        assert!(stale.get_all_word_reviews().is_empty());
    }
}
