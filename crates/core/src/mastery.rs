//! Mastery & XP model.
//!
//! Pure functions that turn attempt outcomes into bounded mastery values,
//! XP awards, star ratings and levels. Nothing here owns state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AttemptNumber, Difficulty, ItemProgress, Score};
use crate::time::elapsed_days;

pub const MASTERY_MIN: f64 = 0.0;
pub const MASTERY_MAX: f64 = 100.0;

/// XP needed per level step; level `n` starts at `XP_PER_LEVEL_STEP * (n-1) * n / 2`.
const XP_PER_LEVEL_STEP: u64 = 100;
const FIRST_COMPLETION_BONUS: u32 = 5;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("correct gain must be finite and >= 0, got {0}")]
    InvalidCorrectGain(f64),
    #[error("incorrect loss must be finite and >= 0, got {0}")]
    InvalidIncorrectLoss(f64),
    #[error("completion threshold must be in [0, 100], got {0}")]
    InvalidCompletionThreshold(f64),
    #[error("decay rate must be in [0, 1), got {0}")]
    InvalidDecayRate(f64),
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Tuning knobs for the mastery curve.
///
/// Deserialising goes through [`MasteryConfig::new`], so stored configs are
/// validated the same way as hand-built ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MasteryConfigFields")]
pub struct MasteryConfig {
    correct_gain: f64,
    incorrect_loss: f64,
    min_attempts_for_mastery: u32,
    completion_threshold: f64,
    decay_rate: f64,
}

impl MasteryConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is non-finite or out of its range.
    pub fn new(
        correct_gain: f64,
        incorrect_loss: f64,
        min_attempts_for_mastery: u32,
        completion_threshold: f64,
        decay_rate: f64,
    ) -> Result<Self, ConfigError> {
        if !correct_gain.is_finite() || correct_gain < 0.0 {
            return Err(ConfigError::InvalidCorrectGain(correct_gain));
        }
        if !incorrect_loss.is_finite() || incorrect_loss < 0.0 {
            return Err(ConfigError::InvalidIncorrectLoss(incorrect_loss));
        }
        if !(MASTERY_MIN..=MASTERY_MAX).contains(&completion_threshold) {
            return Err(ConfigError::InvalidCompletionThreshold(completion_threshold));
        }
        if !(0.0..1.0).contains(&decay_rate) {
            return Err(ConfigError::InvalidDecayRate(decay_rate));
        }

        Ok(Self {
            correct_gain,
            incorrect_loss,
            min_attempts_for_mastery,
            completion_threshold,
            decay_rate,
        })
    }

    #[must_use]
    pub fn correct_gain(&self) -> f64 {
        self.correct_gain
    }

    #[must_use]
    pub fn incorrect_loss(&self) -> f64 {
        self.incorrect_loss
    }

    #[must_use]
    pub fn min_attempts_for_mastery(&self) -> u32 {
        self.min_attempts_for_mastery
    }

    #[must_use]
    pub fn completion_threshold(&self) -> f64 {
        self.completion_threshold
    }

    #[must_use]
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// Read-time decay policy matching this config's `decay_rate`.
    #[must_use]
    pub fn decay_policy(&self) -> ExponentialDecay {
        ExponentialDecay::new(self.decay_rate)
    }
}

#[derive(Deserialize)]
struct MasteryConfigFields {
    correct_gain: f64,
    incorrect_loss: f64,
    min_attempts_for_mastery: u32,
    completion_threshold: f64,
    decay_rate: f64,
}

impl TryFrom<MasteryConfigFields> for MasteryConfig {
    type Error = ConfigError;

    fn try_from(f: MasteryConfigFields) -> Result<Self, Self::Error> {
        Self::new(
            f.correct_gain,
            f.incorrect_loss,
            f.min_attempts_for_mastery,
            f.completion_threshold,
            f.decay_rate,
        )
    }
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            correct_gain: 25.0,
            incorrect_loss: 10.0,
            min_attempts_for_mastery: 3,
            completion_threshold: 80.0,
            decay_rate: 0.05,
        }
    }
}

//
// ─── MASTERY ───────────────────────────────────────────────────────────────────
//

/// Compute the mastery value after one attempt.
///
/// Correct answers add `correct_gain / attempt`, so needing more tries earns less.
/// Wrong answers subtract a flat `incorrect_loss`. The result stays in `[0, 100]`.
///
/// # Examples
///
/// ```
/// # use literacy_core::mastery::{calculate_mastery, MasteryConfig};
/// # use literacy_core::model::AttemptNumber;
/// let cfg = MasteryConfig::default();
/// assert_eq!(calculate_mastery(0.0, true, AttemptNumber::FIRST, &cfg), 25.0);
/// assert_eq!(calculate_mastery(5.0, false, AttemptNumber::FIRST, &cfg), 0.0);
/// ```
#[must_use]
pub fn calculate_mastery(
    current: f64,
    is_correct: bool,
    attempt: AttemptNumber,
    config: &MasteryConfig,
) -> f64 {
    let current = clamp_mastery(current);
    if is_correct {
        let gain = config.correct_gain / f64::from(attempt.value());
        (current + gain).min(MASTERY_MAX)
    } else {
        (current - config.incorrect_loss).max(MASTERY_MIN)
    }
}

/// Clamp into `[0, 100]`; NaN becomes `0`.
#[must_use]
pub fn clamp_mastery(value: f64) -> f64 {
    if value.is_nan() {
        return MASTERY_MIN;
    }
    value.clamp(MASTERY_MIN, MASTERY_MAX)
}

/// True once an item has both enough attempts and enough mastery.
#[must_use]
pub fn is_item_mastered(progress: &ItemProgress, config: &MasteryConfig) -> bool {
    progress.attempts() >= config.min_attempts_for_mastery
        && progress.mastery() >= config.completion_threshold
}

//
// ─── DECAY ─────────────────────────────────────────────────────────────────────
//

/// View-time forgetting adjustment. Implementations never touch stored state.
pub trait DecayPolicy: Send + Sync {
    /// Mastery to report after `elapsed_days` without practice.
    fn decayed(&self, mastery: f64, elapsed_days: f64) -> f64;
}

/// Reports stored mastery unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecay;

impl DecayPolicy for NoDecay {
    fn decayed(&self, mastery: f64, _elapsed_days: f64) -> f64 {
        clamp_mastery(mastery)
    }
}

/// `mastery * (1 - rate)^days` once more than one whole day has elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDecay {
    rate: f64,
}

impl ExponentialDecay {
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl DecayPolicy for ExponentialDecay {
    #[allow(clippy::cast_possible_truncation)]
    fn decayed(&self, mastery: f64, elapsed_days: f64) -> f64 {
        let mastery = clamp_mastery(mastery);
        if !elapsed_days.is_finite() || elapsed_days <= 1.0 {
            return mastery;
        }
        let days = elapsed_days.floor().min(f64::from(i32::MAX)) as i32;
        clamp_mastery(mastery * (1.0 - self.rate).powi(days))
    }
}

/// Mastery of `progress` as seen at `now` under `policy`.
#[must_use]
pub fn mastery_at(progress: &ItemProgress, now: DateTime<Utc>, policy: &dyn DecayPolicy) -> f64 {
    policy.decayed(
        progress.mastery(),
        elapsed_days(progress.last_attempt_at(), now),
    )
}

//
// ─── XP / STARS / LEVELS ───────────────────────────────────────────────────────
//

/// `round(score / 10) + 2 * difficulty`, plus a bonus on first completion.
#[must_use]
pub fn calculate_xp(score: Score, difficulty: Difficulty, is_first_completion: bool) -> u32 {
    let score_part = (u32::from(score.value()) + 5) / 10;
    let difficulty_part = u32::from(difficulty.value()) * 2;
    let bonus = if is_first_completion {
        FIRST_COMPLETION_BONUS
    } else {
        0
    };
    score_part + difficulty_part + bonus
}

/// Star rating for a score. Lower bounds are inclusive: 90/70/50.
#[must_use]
pub fn calculate_stars(score: Score) -> u8 {
    match score.value() {
        90..=100 => 3,
        70..=89 => 2,
        50..=69 => 1,
        _ => 0,
    }
}

/// Cumulative XP needed to reach `level`. Level 1 needs nothing.
#[must_use]
pub fn xp_for_level(level: u32) -> u64 {
    let n = u64::from(level.max(1));
    XP_PER_LEVEL_STEP.saturating_mul(n.saturating_mul(n - 1) / 2)
}

/// Level reached with `total_xp`. `level_for_xp(0) == 1`, non-decreasing in XP.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn level_for_xp(total_xp: u64) -> u32 {
    // n(n-1)/2 * 100 <= xp  =>  n ~ (1 + sqrt(1 + 8 * xp / 100)) / 2
    let estimate = (1.0 + (1.0 + 8.0 * (total_xp as f64) / XP_PER_LEVEL_STEP as f64).sqrt()) / 2.0;
    let mut level = (estimate.floor() as u32).max(1);
    while level > 1 && xp_for_level(level) > total_xp {
        level -= 1;
    }
    while level < u32::MAX && xp_for_level(level + 1) <= total_xp {
        level += 1;
    }
    level
}

/// Where a learner stands inside their current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_for_next: u64,
}

impl LevelProgress {
    #[must_use]
    pub fn from_total(total_xp: u64) -> Self {
        let level = level_for_xp(total_xp);
        let floor = xp_for_level(level);
        let ceiling = xp_for_level(level.saturating_add(1));
        Self {
            level,
            xp_into_level: total_xp - floor,
            xp_for_next: ceiling.saturating_sub(total_xp),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn score(v: i64) -> Score {
        Score::new(v).unwrap()
    }

    fn difficulty(v: i64) -> Difficulty {
        Difficulty::new(v).unwrap()
    }

    #[test]
    fn correct_never_lowers_and_incorrect_never_raises() {
        let cfg = MasteryConfig::default();
        for current in [0.0, 12.5, 50.0, 79.9, 99.0, 100.0] {
            for n in 1..=6 {
                let attempt = AttemptNumber::new(n).unwrap();
                let up = calculate_mastery(current, true, attempt, &cfg);
                let down = calculate_mastery(current, false, attempt, &cfg);
                assert!(up >= current && up <= MASTERY_MAX);
                assert!(down <= current && down >= MASTERY_MIN);
            }
        }
    }

    #[test]
    fn gain_diminishes_with_attempt_number() {
        let cfg = MasteryConfig::default();
        let first = calculate_mastery(0.0, true, AttemptNumber::FIRST, &cfg);
        let fifth = calculate_mastery(0.0, true, AttemptNumber::new(5).unwrap(), &cfg);
        assert!(first > fifth);
        assert!((fifth - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn incorrect_penalty_ignores_attempt_number() {
        let cfg = MasteryConfig::default();
        let a = calculate_mastery(50.0, false, AttemptNumber::FIRST, &cfg);
        let b = calculate_mastery(50.0, false, AttemptNumber::new(9).unwrap(), &cfg);
        assert_eq!(a, 40.0);
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_current_is_clamped() {
        let cfg = MasteryConfig::default();
        assert_eq!(calculate_mastery(150.0, true, AttemptNumber::FIRST, &cfg), 100.0);
        assert_eq!(calculate_mastery(f64::NAN, false, AttemptNumber::FIRST, &cfg), 0.0);
    }

    #[test]
    fn stars_are_boundary_exact() {
        assert_eq!(calculate_stars(score(100)), 3);
        assert_eq!(calculate_stars(score(90)), 3);
        assert_eq!(calculate_stars(score(89)), 2);
        assert_eq!(calculate_stars(score(70)), 2);
        assert_eq!(calculate_stars(score(69)), 1);
        assert_eq!(calculate_stars(score(50)), 1);
        assert_eq!(calculate_stars(score(49)), 0);
        assert_eq!(calculate_stars(score(0)), 0);
    }

    #[test]
    fn xp_rewards_difficulty_and_first_completion() {
        assert!(
            calculate_xp(score(100), difficulty(5), false)
                > calculate_xp(score(100), difficulty(1), false)
        );
        for s in [0, 45, 55, 100] {
            for d in 1..=5 {
                assert_eq!(
                    calculate_xp(score(s), difficulty(d), true),
                    calculate_xp(score(s), difficulty(d), false) + 5
                );
            }
        }
    }

    #[test]
    fn xp_has_difficulty_floor_and_rounds_half_up() {
        assert_eq!(calculate_xp(score(0), difficulty(3), false), 6);
        assert_eq!(calculate_xp(score(45), difficulty(1), false), 5 + 2);
        assert_eq!(calculate_xp(score(44), difficulty(1), false), 4 + 2);
    }

    #[test]
    fn levels_follow_triangular_thresholds() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(299), 2);
        assert_eq!(level_for_xp(300), 3);
        assert_eq!(level_for_xp(600), 4);
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(4), 600);
    }

    #[test]
    fn level_is_non_decreasing() {
        let mut previous = level_for_xp(0);
        for xp in (0..5_000).step_by(7) {
            let level = level_for_xp(xp);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn level_progress_splits_total() {
        let p = LevelProgress::from_total(350);
        assert_eq!(p.level, 3);
        assert_eq!(p.xp_into_level, 50);
        assert_eq!(p.xp_for_next, 250);
    }

    #[test]
    fn decay_applies_only_after_a_full_day() {
        let policy = ExponentialDecay::new(0.05);
        assert_eq!(policy.decayed(80.0, 0.5), 80.0);
        assert_eq!(policy.decayed(80.0, 1.0), 80.0);
        let two_days = policy.decayed(80.0, 2.3);
        assert!((two_days - 80.0 * 0.95 * 0.95).abs() < 1e-9);
        assert_eq!(NoDecay.decayed(80.0, 30.0), 80.0);
    }

    #[test]
    fn mastery_at_reads_without_mutation() {
        let cfg = MasteryConfig::default();
        let mut item = ItemProgress::new(ItemId::new("a"), fixed_now());
        item.apply_attempt(true, fixed_now(), &cfg);
        let later = fixed_now() + Duration::days(3);
        let seen = mastery_at(&item, later, &cfg.decay_policy());
        assert!(seen < item.mastery());
        assert_eq!(item.mastery(), 25.0);
    }

    #[test]
    fn mastered_needs_attempts_and_threshold() {
        let cfg = MasteryConfig::default();
        let mut item = ItemProgress::new(ItemId::new("a"), fixed_now());
        for _ in 0..2 {
            item.apply_attempt(true, fixed_now(), &cfg);
        }
        assert!(!is_item_mastered(&item, &cfg));
        // 25 * H(14) is the first harmonic sum above 80.
        for _ in 0..12 {
            item.apply_attempt(true, fixed_now(), &cfg);
        }
        assert!(is_item_mastered(&item, &cfg));
    }

    #[test]
    fn config_rejects_invalid_values() {
        assert!(matches!(
            MasteryConfig::new(-1.0, 10.0, 3, 80.0, 0.05),
            Err(ConfigError::InvalidCorrectGain(_))
        ));
        assert!(matches!(
            MasteryConfig::new(25.0, 10.0, 3, 120.0, 0.05),
            Err(ConfigError::InvalidCompletionThreshold(_))
        ));
        assert!(matches!(
            MasteryConfig::new(25.0, 10.0, 3, 80.0, 1.0),
            Err(ConfigError::InvalidDecayRate(_))
        ));
    }

    #[test]
    fn deserialising_runs_validation() {
        let json = serde_json::to_string(&MasteryConfig::default()).unwrap();
        let back: MasteryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MasteryConfig::default());

        let bad = r#"{"correct_gain":25.0,"incorrect_loss":10.0,"min_attempts_for_mastery":3,
            "completion_threshold":80.0,"decay_rate":1.5}"#;
        let err = serde_json::from_str::<MasteryConfig>(bad).unwrap_err();
        assert!(err.to_string().contains("decay rate"));
    }
}
