use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejected construction of a validated value type.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValueError {
    #[error("score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(i64),

    #[error("attempt number must be at least 1, got {0}")]
    AttemptOutOfRange(u32),

    #[error("difficulty must be between 1 and 5, got {0}")]
    DifficultyOutOfRange(i64),

    #[error("smoothness must be a finite value in [0, 1], got {0}")]
    SmoothnessOutOfRange(f64),
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Percentage score of a lesson or activity, always in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub const MAX: Score = Score(100);
    pub const ZERO: Score = Score(0);

    /// # Errors
    ///
    /// Returns `ValueError::ScoreOutOfRange` outside `0..=100`.
    pub fn new(value: i64) -> Result<Self, ValueError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(ValueError::ScoreOutOfRange(value))
    }

    /// Clamp an arbitrary value into `0..=100`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = ValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        i64::from(score.0)
    }
}

//
// ─── ATTEMPT NUMBER ────────────────────────────────────────────────────────────
//

/// 1-based ordinal of an attempt at an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptNumber(u32);

impl AttemptNumber {
    pub const FIRST: AttemptNumber = AttemptNumber(1);

    /// # Errors
    ///
    /// Returns `ValueError::AttemptOutOfRange` for `0`.
    pub fn new(value: u32) -> Result<Self, ValueError> {
        if value == 0 {
            return Err(ValueError::AttemptOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Treats `0` as the first attempt.
    #[must_use]
    pub fn clamped(value: u32) -> Self {
        Self(value.max(1))
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Content difficulty tag, `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const EASIEST: Difficulty = Difficulty(1);
    pub const HARDEST: Difficulty = Difficulty(5);

    /// # Errors
    ///
    /// Returns `ValueError::DifficultyOutOfRange` outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, ValueError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (1..=5).contains(v))
            .map(Self)
            .ok_or(ValueError::DifficultyOutOfRange(value))
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 5) as u8)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::EASIEST
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = ValueError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Difficulty> for i64 {
    fn from(difficulty: Difficulty) -> Self {
        i64::from(difficulty.0)
    }
}

//
// ─── SMOOTHNESS ────────────────────────────────────────────────────────────────
//

/// Quality of a spoken/blended word attempt, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Smoothness(f64);

impl Smoothness {
    /// # Errors
    ///
    /// Returns `ValueError::SmoothnessOutOfRange` for non-finite values or values outside `[0, 1]`.
    pub fn new(value: f64) -> Result<Self, ValueError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ValueError::SmoothnessOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Clamp into `[0, 1]`; NaN becomes `0`.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}
