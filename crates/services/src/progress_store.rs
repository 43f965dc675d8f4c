use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use literacy_core::Clock;
use literacy_core::mastery::{
    DecayPolicy, LevelProgress, MasteryConfig, is_item_mastered, mastery_at,
};
use literacy_core::model::{
    ActivityResult, GlobalState, ItemId, ItemProgress, LessonId, LessonProgress, Score, SubjectId,
    UnitId, UnitProgress,
};
use storage::repository::{SnapshotKey, SnapshotRepository};

use crate::error::PersistError;
use crate::persistence::{PROGRESS_SCHEMA_VERSION, load_snapshot, save_snapshot};

//
// ─── SUBJECT STATE ─────────────────────────────────────────────────────────────
//

/// Everything recorded for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectProgress {
    #[serde(default)]
    items: BTreeMap<ItemId, ItemProgress>,
    #[serde(default)]
    lessons: BTreeMap<LessonId, LessonProgress>,
    #[serde(default)]
    units: BTreeMap<UnitId, UnitProgress>,
}

impl SubjectProgress {
    #[must_use]
    pub fn items(&self) -> &BTreeMap<ItemId, ItemProgress> {
        &self.items
    }

    #[must_use]
    pub fn lessons(&self) -> &BTreeMap<LessonId, LessonProgress> {
        &self.lessons
    }

    #[must_use]
    pub fn units(&self) -> &BTreeMap<UnitId, UnitProgress> {
        &self.units
    }

    fn is_consistent(&self) -> bool {
        self.items
            .iter()
            .all(|(id, item)| id == item.item_id() && item.is_consistent())
            && self
                .lessons
                .iter()
                .all(|(id, lesson)| id == lesson.lesson_id() && lesson.is_consistent())
            && self
                .units
                .iter()
                .all(|(id, unit)| *id == unit.unit_id() && unit.is_consistent())
    }
}

/// Persisted shape of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ProgressSnapshot {
    subjects: BTreeMap<SubjectId, SubjectProgress>,
    global: GlobalState,
}

impl ProgressSnapshot {
    fn is_consistent(&self) -> bool {
        self.global.is_consistent() && self.subjects.values().all(SubjectProgress::is_consistent)
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Authoritative per-subject progress and learner-wide XP.
///
/// The only writer of item, lesson and unit progress. Unknown subjects are
/// created on first write; reads of unknown subjects return neutral defaults.
/// Mutations stay in memory until [`ProgressStore::save`] is called.
#[derive(Clone)]
pub struct ProgressStore {
    subjects: BTreeMap<SubjectId, SubjectProgress>,
    global: GlobalState,
    config: MasteryConfig,
    decay: Arc<dyn DecayPolicy>,
    clock: Clock,
}

impl ProgressStore {
    /// Empty store whose read-time decay follows `config.decay_rate`.
    #[must_use]
    pub fn new(config: MasteryConfig, clock: Clock) -> Self {
        let decay: Arc<dyn DecayPolicy> = Arc::new(config.decay_policy());
        Self {
            subjects: BTreeMap::new(),
            global: GlobalState::new(),
            config,
            decay,
            clock,
        }
    }

    /// Replace the read-time decay policy.
    #[must_use]
    pub fn with_decay_policy(mut self, decay: Arc<dyn DecayPolicy>) -> Self {
        self.decay = decay;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MasteryConfig {
        &self.config
    }

    /// Move the store's clock, for tests and simulations on a fixed clock.
    pub fn advance_clock(&mut self, delta: chrono::Duration) {
        self.clock.advance(delta);
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Create empty progress for `subject`. Returns `false` if it already existed.
    pub fn initialize_subject(&mut self, subject: &SubjectId) -> bool {
        if self.subjects.contains_key(subject) {
            return false;
        }
        self.subjects.insert(subject.clone(), SubjectProgress::default());
        tracing::debug!(%subject, "initialized subject");
        true
    }

    fn subject_mut(&mut self, subject: &SubjectId) -> &mut SubjectProgress {
        self.subjects.entry(subject.clone()).or_insert_with(|| {
            tracing::debug!(%subject, "initialized subject");
            SubjectProgress::default()
        })
    }

    /// Record one attempt at `item` and return its new mastery.
    pub fn record_item_attempt(
        &mut self,
        subject: &SubjectId,
        item: &ItemId,
        is_correct: bool,
    ) -> f64 {
        let now = self.clock.now();
        let config = self.config.clone();
        let progress = self
            .subject_mut(subject)
            .items
            .entry(item.clone())
            .or_insert_with(|| ItemProgress::new(item.clone(), now));
        let mastery = progress.apply_attempt(is_correct, now, &config);
        tracing::debug!(
            %subject,
            %item,
            is_correct,
            attempts = progress.attempts(),
            mastery,
            "recorded item attempt"
        );
        mastery
    }

    /// Mark `lesson` completed with `score`, keeping the best score and stars.
    pub fn complete_lesson(
        &mut self,
        subject: &SubjectId,
        lesson: &LessonId,
        score: Score,
    ) -> &LessonProgress {
        let now = self.clock.now();
        let progress = self
            .subject_mut(subject)
            .lessons
            .entry(lesson.clone())
            .or_insert_with(|| LessonProgress::new(lesson.clone()));
        progress.record_completion(score, now);
        tracing::debug!(
            %subject,
            %lesson,
            score = score.value(),
            best = progress.best_score().value(),
            stars = progress.stars_earned(),
            "completed lesson"
        );
        progress
    }

    /// Unlock `unit`. Returns `true` only on the first unlock.
    pub fn unlock_unit(&mut self, subject: &SubjectId, unit: UnitId) -> bool {
        let now = self.clock.now();
        let changed = self
            .subject_mut(subject)
            .units
            .entry(unit)
            .or_insert_with(|| UnitProgress::new(unit))
            .unlock(now);
        if changed {
            tracing::debug!(%subject, %unit, "unlocked unit");
        }
        changed
    }

    /// Complete `unit` (unlocking it if needed). Returns `true` only on the first completion.
    pub fn complete_unit(&mut self, subject: &SubjectId, unit: UnitId) -> bool {
        let now = self.clock.now();
        let changed = self
            .subject_mut(subject)
            .units
            .entry(unit)
            .or_insert_with(|| UnitProgress::new(unit))
            .complete(now);
        if changed {
            tracing::debug!(%subject, %unit, "completed unit");
        }
        changed
    }

    /// Award the activity's XP and count the practice day. Returns `true` on level-up.
    pub fn complete_activity(&mut self, result: &ActivityResult) -> bool {
        let leveled_up = self.global.add_xp(result.xp_earned);
        self.global
            .record_practice_day(result.completed_at.date_naive());
        tracing::debug!(
            activity = %result.activity,
            xp = result.xp_earned,
            total_xp = self.global.total_xp(),
            level = self.global.current_level(),
            "completed activity"
        );
        if leveled_up {
            tracing::info!(level = self.global.current_level(), "level up");
        }
        leveled_up
    }

    /// Clear every subject and reset XP, level and streak.
    pub fn reset_all_progress(&mut self) {
        self.subjects.clear();
        self.global = GlobalState::new();
        tracing::info!("progress reset");
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn get_item_progress(&self, subject: &SubjectId, item: &ItemId) -> Option<&ItemProgress> {
        self.subjects.get(subject)?.items.get(item)
    }

    #[must_use]
    pub fn get_lesson_progress(
        &self,
        subject: &SubjectId,
        lesson: &LessonId,
    ) -> Option<&LessonProgress> {
        self.subjects.get(subject)?.lessons.get(lesson)
    }

    #[must_use]
    pub fn get_unit_progress(&self, subject: &SubjectId, unit: UnitId) -> Option<&UnitProgress> {
        self.subjects.get(subject)?.units.get(&unit)
    }

    /// Stored mastery, `0.0` for unknown items.
    #[must_use]
    pub fn get_item_mastery(&self, subject: &SubjectId, item: &ItemId) -> f64 {
        self.get_item_progress(subject, item)
            .map_or(0.0, ItemProgress::mastery)
    }

    /// Mastery as reported at `now` after the decay policy is applied.
    #[must_use]
    pub fn get_item_mastery_at(
        &self,
        subject: &SubjectId,
        item: &ItemId,
        now: DateTime<Utc>,
    ) -> f64 {
        self.get_item_progress(subject, item)
            .map_or(0.0, |progress| mastery_at(progress, now, self.decay.as_ref()))
    }

    /// Stored mastery has reached the completion threshold.
    #[must_use]
    pub fn is_item_completed(&self, subject: &SubjectId, item: &ItemId) -> bool {
        self.get_item_mastery(subject, item) >= self.config.completion_threshold()
    }

    /// Completed and attempted at least `min_attempts_for_mastery` times.
    #[must_use]
    pub fn is_item_mastered(&self, subject: &SubjectId, item: &ItemId) -> bool {
        self.get_item_progress(subject, item)
            .is_some_and(|progress| is_item_mastered(progress, &self.config))
    }

    #[must_use]
    pub fn is_lesson_completed(&self, subject: &SubjectId, lesson: &LessonId) -> bool {
        self.get_lesson_progress(subject, lesson)
            .is_some_and(LessonProgress::completed)
    }

    #[must_use]
    pub fn is_unit_unlocked(&self, subject: &SubjectId, unit: UnitId) -> bool {
        self.get_unit_progress(subject, unit)
            .is_some_and(UnitProgress::is_unlocked)
    }

    /// Completed units in `subject`.
    #[must_use]
    pub fn completed_unit_count(&self, subject: &SubjectId) -> usize {
        self.subjects
            .get(subject)
            .map_or(0, |s| s.units.values().filter(|u| u.completed()).count())
    }

    #[must_use]
    pub fn subject(&self, subject: &SubjectId) -> Option<&SubjectProgress> {
        self.subjects.get(subject)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &SubjectId> {
        self.subjects.keys()
    }

    #[must_use]
    pub fn global_state(&self) -> &GlobalState {
        &self.global
    }

    #[must_use]
    pub fn level_progress(&self) -> LevelProgress {
        LevelProgress::from_total(self.global.total_xp())
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    /// Restore the store from its snapshot, or start empty if none is usable.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Storage` if the backend cannot be read.
    pub async fn load(
        repo: &dyn SnapshotRepository,
        config: MasteryConfig,
        clock: Clock,
    ) -> Result<Self, PersistError> {
        let mut store = Self::new(config, clock);
        let snapshot: Option<ProgressSnapshot> =
            load_snapshot(repo, SnapshotKey::Progress, PROGRESS_SCHEMA_VERSION).await?;
        match snapshot {
            Some(snapshot) if snapshot.is_consistent() => {
                tracing::info!(subjects = snapshot.subjects.len(), "restored progress");
                store.subjects = snapshot.subjects;
                store.global = snapshot.global;
            }
            Some(_) => {
                tracing::warn!("discarding progress snapshot that violates invariants");
            }
            None => {}
        }
        Ok(store)
    }

    /// Write the whole store as one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` if encoding or the write fails.
    pub async fn save(&self, repo: &dyn SnapshotRepository) -> Result<(), PersistError> {
        let snapshot = ProgressSnapshot {
            subjects: self.subjects.clone(),
            global: self.global.clone(),
        };
        save_snapshot(
            repo,
            SnapshotKey::Progress,
            PROGRESS_SCHEMA_VERSION,
            &snapshot,
            self.clock.now(),
        )
        .await
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(MasteryConfig::default(), Clock::default())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use literacy_core::mastery::NoDecay;
    use literacy_core::model::{ActivityKind, Difficulty};
    use literacy_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, SnapshotRecord};

    fn store() -> ProgressStore {
        ProgressStore::new(MasteryConfig::default(), fixed_clock())
    }

    fn math() -> SubjectId {
        SubjectId::new("math")
    }

    #[test]
    fn initialize_twice_keeps_history() {
        let mut store = store();
        assert!(store.initialize_subject(&math()));
        store.record_item_attempt(&math(), &ItemId::new("2+2"), true);
        assert!(!store.initialize_subject(&math()));
        assert_eq!(
            store
                .get_item_progress(&math(), &ItemId::new("2+2"))
                .unwrap()
                .attempts(),
            1
        );
    }

    #[test]
    fn attempts_update_streak_and_mastery() {
        let mut store = store();
        let item = ItemId::new("b");
        assert_eq!(store.record_item_attempt(&math(), &item, true), 25.0);
        assert_eq!(store.record_item_attempt(&math(), &item, true), 37.5);
        assert_eq!(store.record_item_attempt(&math(), &item, false), 27.5);

        let progress = store.get_item_progress(&math(), &item).unwrap();
        assert_eq!(progress.attempts(), 3);
        assert_eq!(progress.correct_attempts(), 2);
        assert_eq!(progress.streak_count(), 0);
        assert!(!store.is_item_completed(&math(), &item));
    }

    #[test]
    fn unknown_lookups_are_neutral() {
        let store = store();
        let reading = SubjectId::new("reading");
        assert_eq!(store.get_item_mastery(&reading, &ItemId::new("x")), 0.0);
        assert!(!store.is_item_completed(&reading, &ItemId::new("x")));
        assert!(!store.is_lesson_completed(&reading, &LessonId::new("l1")));
        assert!(!store.is_unit_unlocked(&reading, UnitId::new(1)));
        assert!(store.get_unit_progress(&reading, UnitId::new(1)).is_none());
    }

    #[test]
    fn best_score_and_stars_never_drop() {
        let mut store = store();
        let lesson = LessonId::new("short-a");
        store.complete_lesson(&math(), &lesson, Score::clamped(95));
        let progress = store.complete_lesson(&math(), &lesson, Score::clamped(70));
        assert_eq!(progress.best_score().value(), 95);
        assert_eq!(progress.stars_earned(), 3);
        assert!(store.is_lesson_completed(&math(), &lesson));
    }

    #[test]
    fn unlock_is_idempotent() {
        let mut once = store();
        once.unlock_unit(&math(), UnitId::new(2));

        let mut twice = store();
        assert!(twice.unlock_unit(&math(), UnitId::new(2)));
        assert!(!twice.unlock_unit(&math(), UnitId::new(2)));

        assert_eq!(
            once.get_unit_progress(&math(), UnitId::new(2)),
            twice.get_unit_progress(&math(), UnitId::new(2))
        );
        assert!(twice.is_unit_unlocked(&math(), UnitId::new(2)));
    }

    #[test]
    fn complete_unit_stamps_once() {
        let mut store = store();
        assert!(store.complete_unit(&math(), UnitId::new(1)));
        let first = store
            .get_unit_progress(&math(), UnitId::new(1))
            .unwrap()
            .completed_at();
        assert!(!store.complete_unit(&math(), UnitId::new(1)));
        let second = store
            .get_unit_progress(&math(), UnitId::new(1))
            .unwrap()
            .completed_at();
        assert_eq!(first, second);
        assert_eq!(store.completed_unit_count(&math()), 1);
    }

    #[test]
    fn activity_xp_levels_up_and_counts_streak() {
        let mut store = store();
        let day_one = ActivityResult {
            activity: ActivityKind::SoundOut,
            score: Score::MAX,
            xp_earned: 120,
            completed_at: fixed_now(),
        };
        assert!(store.complete_activity(&day_one));
        assert_eq!(store.global_state().current_level(), 2);
        assert_eq!(store.global_state().daily_streak(), 1);

        let day_two = ActivityResult::scored(
            ActivityKind::BuildWord,
            Score::clamped(80),
            Difficulty::EASIEST,
            false,
            fixed_now() + Duration::days(1),
        );
        store.complete_activity(&day_two);
        assert_eq!(store.global_state().daily_streak(), 2);
        assert_eq!(store.global_state().total_xp(), 130);
        assert_eq!(store.level_progress().xp_into_level, 30);
    }

    #[test]
    fn reset_matches_fresh_store() {
        let mut store = store();
        store.record_item_attempt(&math(), &ItemId::new("a"), true);
        store.complete_activity(&ActivityResult {
            activity: ActivityKind::ReadSentence,
            score: Score::MAX,
            xp_earned: 500,
            completed_at: fixed_now(),
        });
        store.reset_all_progress();

        let fresh = ProgressStore::new(MasteryConfig::default(), fixed_clock());
        assert_eq!(store.global_state(), fresh.global_state());
        assert_eq!(store.global_state().total_xp(), 0);
        assert_eq!(store.global_state().current_level(), 1);
        assert_eq!(store.subjects().count(), 0);
    }

    #[test]
    fn decay_only_applies_at_read_time() {
        let mut store = store();
        let item = ItemId::new("cat");
        store.record_item_attempt(&math(), &item, true);
        let later = fixed_now() + Duration::days(3);

        let decayed = store.get_item_mastery_at(&math(), &item, later);
        assert!((decayed - 25.0 * 0.95_f64.powi(3)).abs() < 1e-9);
        assert_eq!(store.get_item_mastery(&math(), &item), 25.0);

        let flat = store.clone().with_decay_policy(Arc::new(NoDecay));
        assert_eq!(flat.get_item_mastery_at(&math(), &item, later), 25.0);
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let repo = InMemoryRepository::new();
        let mut store = store();
        store.record_item_attempt(&math(), &ItemId::new("a"), true);
        store.unlock_unit(&math(), UnitId::new(3));
        store.complete_lesson(&math(), &LessonId::new("l1"), Score::clamped(88));
        store.save(&repo).await.unwrap();

        let loaded = ProgressStore::load(&repo, MasteryConfig::default(), fixed_clock())
            .await
            .unwrap();
        assert_eq!(loaded.subject(&math()), store.subject(&math()));
        assert_eq!(loaded.global_state(), store.global_state());
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_empty() {
        let repo = InMemoryRepository::new();
        repo.save(&SnapshotRecord::new(
            SnapshotKey::Progress,
            PROGRESS_SCHEMA_VERSION,
            "{\"subjects\": 42}",
            fixed_now(),
        ))
        .await
        .unwrap();

        let loaded = ProgressStore::load(&repo, MasteryConfig::default(), fixed_clock())
            .await
            .unwrap();
        assert_eq!(loaded.subjects().count(), 0);
        assert_eq!(loaded.global_state().current_level(), 1);
    }
}
