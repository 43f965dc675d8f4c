use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::mastery::{
    MASTERY_MAX, MASTERY_MIN, MasteryConfig, calculate_mastery, calculate_stars, calculate_xp,
    level_for_xp,
};
use crate::model::{ActivityKind, AttemptNumber, Difficulty, ItemId, LessonId, Score, UnitId};

//
// ─── ITEM PROGRESS ─────────────────────────────────────────────────────────────
//

/// Attempt history and mastery for one practice item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    item_id: ItemId,
    attempts: u32,
    correct_attempts: u32,
    mastery: f64,
    streak_count: u32,
    last_attempt_at: DateTime<Utc>,
}

impl ItemProgress {
    /// Fresh record with no attempts yet.
    #[must_use]
    pub fn new(item_id: ItemId, created_at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            attempts: 0,
            correct_attempts: 0,
            mastery: MASTERY_MIN,
            streak_count: 0,
            last_attempt_at: created_at,
        }
    }

    /// Record one attempt and return the new mastery.
    ///
    /// The post-increment attempt count is the attempt number fed to the mastery curve.
    pub fn apply_attempt(
        &mut self,
        is_correct: bool,
        attempted_at: DateTime<Utc>,
        config: &MasteryConfig,
    ) -> f64 {
        self.attempts = self.attempts.saturating_add(1);
        if is_correct {
            self.correct_attempts = self.correct_attempts.saturating_add(1);
            self.streak_count = self.streak_count.saturating_add(1);
        } else {
            self.streak_count = 0;
        }
        self.mastery = calculate_mastery(
            self.mastery,
            is_correct,
            AttemptNumber::clamped(self.attempts),
            config,
        );
        self.last_attempt_at = attempted_at;
        self.mastery
    }

    #[must_use]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn correct_attempts(&self) -> u32 {
        self.correct_attempts
    }

    #[must_use]
    pub fn mastery(&self) -> f64 {
        self.mastery
    }

    #[must_use]
    pub fn streak_count(&self) -> u32 {
        self.streak_count
    }

    #[must_use]
    pub fn last_attempt_at(&self) -> DateTime<Utc> {
        self.last_attempt_at
    }

    /// Checks invariants on a rehydrated record.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.correct_attempts <= self.attempts
            && self.streak_count <= self.correct_attempts
            && (MASTERY_MIN..=MASTERY_MAX).contains(&self.mastery)
    }
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// Completion state of a lesson with best-of-all-attempts scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    lesson_id: LessonId,
    completed: bool,
    best_score: Score,
    stars_earned: u8,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completions: u32,
}

impl LessonProgress {
    #[must_use]
    pub fn new(lesson_id: LessonId) -> Self {
        Self {
            lesson_id,
            completed: false,
            best_score: Score::ZERO,
            stars_earned: 0,
            completed_at: None,
            completions: 0,
        }
    }

    /// Register a completion. Best score and stars never go down.
    pub fn record_completion(&mut self, score: Score, completed_at: DateTime<Utc>) {
        self.completed = true;
        self.completions = self.completions.saturating_add(1);
        self.best_score = self.best_score.max(score);
        self.stars_earned = calculate_stars(self.best_score);
        if self.completed_at.is_none() {
            self.completed_at = Some(completed_at);
        }
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn best_score(&self) -> Score {
        self.best_score
    }

    #[must_use]
    pub fn stars_earned(&self) -> u8 {
        self.stars_earned
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn completions(&self) -> u32 {
        self.completions
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.stars_earned == calculate_stars(self.best_score)
            && (self.completed || self.completed_at.is_none())
    }
}

//
// ─── UNIT PROGRESS ─────────────────────────────────────────────────────────────
//

/// Lock/completion state of a curriculum unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProgress {
    unit_id: UnitId,
    unlocked_at: Option<DateTime<Utc>>,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl UnitProgress {
    /// A locked, incomplete unit.
    #[must_use]
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            unlocked_at: None,
            completed: false,
            completed_at: None,
        }
    }

    /// Unlock the unit. Returns `false` if it was already unlocked.
    pub fn unlock(&mut self, at: DateTime<Utc>) -> bool {
        if self.unlocked_at.is_some() {
            return false;
        }
        self.unlocked_at = Some(at);
        true
    }

    /// Mark the unit complete, unlocking it if needed.
    ///
    /// Returns `false` if it was already complete; `completed_at` keeps the first stamp.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.unlock(at);
        self.completed = true;
        self.completed_at = Some(at);
        true
    }

    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }

    #[must_use]
    pub fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        self.unlocked_at
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some()
            && (!self.completed || self.unlocked_at.is_some())
    }
}

//
// ─── GLOBAL STATE ──────────────────────────────────────────────────────────────
//

/// Learner-wide XP, level and daily streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    total_xp: u64,
    current_level: u32,
    daily_streak: u32,
    #[serde(default)]
    last_practice_day: Option<NaiveDate>,
}

impl GlobalState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_xp: 0,
            current_level: 1,
            daily_streak: 0,
            last_practice_day: None,
        }
    }

    /// Add XP and recompute the level. Returns `true` on level-up.
    pub fn add_xp(&mut self, xp: u32) -> bool {
        self.total_xp = self.total_xp.saturating_add(u64::from(xp));
        let level = level_for_xp(self.total_xp).max(self.current_level);
        let leveled_up = level > self.current_level;
        self.current_level = level;
        leveled_up
    }

    /// Count a practice day: same day keeps the streak, next day extends it, a gap restarts it.
    pub fn record_practice_day(&mut self, day: NaiveDate) {
        self.daily_streak = match self.last_practice_day {
            Some(last) if last == day => self.daily_streak.max(1),
            Some(last) if last.succ_opt() == Some(day) => self.daily_streak.saturating_add(1),
            // Clock skew into the past: keep what we have.
            Some(last) if day < last => return,
            _ => 1,
        };
        self.last_practice_day = Some(day);
    }

    #[must_use]
    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    #[must_use]
    pub fn current_level(&self) -> u32 {
        self.current_level
    }

    #[must_use]
    pub fn daily_streak(&self) -> u32 {
        self.daily_streak
    }

    #[must_use]
    pub fn last_practice_day(&self) -> Option<NaiveDate> {
        self.last_practice_day
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.current_level >= 1 && self.current_level == level_for_xp(self.total_xp)
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

//
// ─── ACTIVITY RESULT ───────────────────────────────────────────────────────────
//

/// Outcome of one finished activity, as reported by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResult {
    pub activity: ActivityKind,
    pub score: Score,
    pub xp_earned: u32,
    pub completed_at: DateTime<Utc>,
}

impl ActivityResult {
    /// Build a result whose XP comes from the XP model.
    #[must_use]
    pub fn scored(
        activity: ActivityKind,
        score: Score,
        difficulty: Difficulty,
        is_first_completion: bool,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            activity,
            score,
            xp_earned: calculate_xp(score, difficulty, is_first_completion),
            completed_at,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn item_attempts_track_streak_and_accuracy() {
        let cfg = MasteryConfig::default();
        let mut item = ItemProgress::new(ItemId::new("b"), fixed_now());
        item.apply_attempt(true, fixed_now(), &cfg);
        item.apply_attempt(true, fixed_now(), &cfg);
        assert_eq!(item.streak_count(), 2);
        item.apply_attempt(false, fixed_now(), &cfg);
        assert_eq!(item.attempts(), 3);
        assert_eq!(item.correct_attempts(), 2);
        assert_eq!(item.streak_count(), 0);
        assert!(item.is_consistent());
        // 25 + 12.5 - 10
        assert!((item.mastery() - 27.5).abs() < 1e-9);
    }

    #[test]
    fn lesson_keeps_best_score_and_stars() {
        let mut lesson = LessonProgress::new(LessonId::new("l1"));
        let first_at = fixed_now();
        lesson.record_completion(Score::new(95).unwrap(), first_at);
        lesson.record_completion(Score::new(70).unwrap(), first_at + Duration::hours(1));
        assert_eq!(lesson.best_score().value(), 95);
        assert_eq!(lesson.stars_earned(), 3);
        assert_eq!(lesson.completed_at(), Some(first_at));
        assert_eq!(lesson.completions(), 2);
    }

    #[test]
    fn unit_unlock_and_complete_are_idempotent() {
        let mut unit = UnitProgress::new(UnitId::new(1));
        assert!(unit.unlock(fixed_now()));
        assert!(!unit.unlock(fixed_now() + Duration::days(1)));
        assert_eq!(unit.unlocked_at(), Some(fixed_now()));

        let done_at = fixed_now() + Duration::days(2);
        assert!(unit.complete(done_at));
        assert!(!unit.complete(done_at + Duration::days(1)));
        assert_eq!(unit.completed_at(), Some(done_at));
        assert!(unit.is_consistent());
    }

    #[test]
    fn completing_locked_unit_unlocks_it() {
        let mut unit = UnitProgress::new(UnitId::new(4));
        unit.complete(fixed_now());
        assert!(unit.is_unlocked());
    }

    #[test]
    fn global_state_levels_up() {
        let mut global = GlobalState::new();
        assert!(!global.add_xp(99));
        assert_eq!(global.current_level(), 1);
        assert!(global.add_xp(1));
        assert_eq!(global.current_level(), 2);
        assert!(global.is_consistent());
    }

    #[test]
    fn daily_streak_counts_consecutive_days() {
        let mut global = GlobalState::new();
        let day = fixed_now().date_naive();
        global.record_practice_day(day);
        global.record_practice_day(day);
        assert_eq!(global.daily_streak(), 1);
        global.record_practice_day(day.succ_opt().unwrap());
        assert_eq!(global.daily_streak(), 2);
        global.record_practice_day(day + Duration::days(5));
        assert_eq!(global.daily_streak(), 1);
    }

    #[test]
    fn scored_result_uses_xp_model() {
        let result = ActivityResult::scored(
            ActivityKind::SoundOut,
            Score::new(80).unwrap(),
            Difficulty::new(2).unwrap(),
            true,
            fixed_now(),
        );
        assert_eq!(result.xp_earned, 8 + 4 + 5);
    }
}
