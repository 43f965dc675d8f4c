//! Read-only content records supplied by external catalogs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Difficulty, LessonId, UnitId};

/// A practice word and the first unit where it becomes decodable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub min_unit: UnitId,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl VocabularyEntry {
    #[must_use]
    pub fn new(word: impl Into<String>, min_unit: UnitId, difficulty: Difficulty) -> Self {
        Self {
            word: word.into(),
            min_unit,
            difficulty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonRef {
    pub lesson_id: LessonId,
    pub problems: Vec<String>,
    pub objectives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub unit_id: UnitId,
    pub lessons: Vec<LessonId>,
}

//
// ─── LETTER PROGRESSION ───────────────────────────────────────────────────────
//

/// Letters introduced per unit. A word is decodable at a unit when all of its
/// letters were introduced at or before that unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LetterProgression {
    units: BTreeMap<UnitId, BTreeSet<char>>,
}

impl LetterProgression {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the letters a unit introduces (case-insensitive).
    #[must_use]
    pub fn with_unit(mut self, unit: UnitId, letters: &str) -> Self {
        self.units
            .entry(unit)
            .or_default()
            .extend(letters.chars().filter(|c| c.is_alphabetic()).flat_map(char::to_lowercase));
        self
    }

    /// Every letter unlocked up to and including `unit`.
    #[must_use]
    pub fn unlocked_letters(&self, unit: UnitId) -> BTreeSet<char> {
        self.units
            .range(..=unit)
            .flat_map(|(_, letters)| letters.iter().copied())
            .collect()
    }

    #[must_use]
    pub fn is_decodable(&self, word: &str, unit: UnitId) -> bool {
        let unlocked = self.unlocked_letters(unit);
        word.chars()
            .filter(|c| c.is_alphabetic())
            .flat_map(char::to_lowercase)
            .all(|c| unlocked.contains(&c))
    }
}

//
// ─── CATALOG PORT ─────────────────────────────────────────────────────────────
//

/// Content the engine consumes but never mutates.
pub trait ContentCatalog: Send + Sync {
    /// Every known vocabulary word.
    fn vocabulary(&self) -> &[VocabularyEntry];

    /// Narrative sentences available for `unit`.
    fn sentences(&self, unit: UnitId) -> &[String];

    /// Vocabulary decodable by `unit` (`min_unit <= unit`), in catalog order.
    fn words_up_to(&self, unit: UnitId) -> Vec<VocabularyEntry> {
        self.vocabulary()
            .iter()
            .filter(|entry| entry.min_unit <= unit)
            .cloned()
            .collect()
    }

    fn has_sentences(&self, unit: UnitId) -> bool {
        !self.sentences(unit).is_empty()
    }

    /// Curriculum units and the lessons each one groups. Empty by default.
    fn units(&self) -> &[UnitRef] {
        &[]
    }

    /// Lesson records known to the catalog. Empty by default.
    fn lessons(&self) -> &[LessonRef] {
        &[]
    }

    /// The unit whose lesson list contains `lesson`.
    fn unit_of_lesson(&self, lesson: &LessonId) -> Option<&UnitRef> {
        self.units().iter().find(|unit| unit.lessons.contains(lesson))
    }

    fn lesson(&self, lesson: &LessonId) -> Option<&LessonRef> {
        self.lessons().iter().find(|l| &l.lesson_id == lesson)
    }
}

/// In-memory catalog for tests, demos and bundled content.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    vocabulary: Vec<VocabularyEntry>,
    sentences: BTreeMap<UnitId, Vec<String>>,
    units: Vec<UnitRef>,
    lessons: Vec<LessonRef>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new(vocabulary: Vec<VocabularyEntry>) -> Self {
        Self {
            vocabulary,
            sentences: BTreeMap::new(),
            units: Vec::new(),
            lessons: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sentence(mut self, unit: UnitId, sentence: impl Into<String>) -> Self {
        self.sentences.entry(unit).or_default().push(sentence.into());
        self
    }

    /// Register a unit and its lessons; lessons get empty problem and objective lists.
    #[must_use]
    pub fn with_unit(mut self, unit_id: UnitId, lessons: &[&str]) -> Self {
        let lessons: Vec<LessonId> = lessons.iter().map(|id| LessonId::new(*id)).collect();
        self.lessons
            .extend(lessons.iter().cloned().map(|lesson_id| LessonRef {
                lesson_id,
                problems: Vec::new(),
                objectives: Vec::new(),
            }));
        self.units.push(UnitRef { unit_id, lessons });
        self
    }
}

impl ContentCatalog for StaticCatalog {
    fn vocabulary(&self) -> &[VocabularyEntry] {
        &self.vocabulary
    }

    fn sentences(&self, unit: UnitId) -> &[String] {
        self.sentences.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }

    fn lessons(&self) -> &[LessonRef] {
        &self.lessons
    }
}
