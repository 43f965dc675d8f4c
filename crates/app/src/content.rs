//! Bundled starter content for the command-line learner.

use literacy_core::model::{
    Difficulty, LetterProgression, StaticCatalog, UnitId, VocabularyEntry,
};

const UNIT_LETTERS: [(u32, &str); 4] = [(1, "satp"), (2, "inmd"), (3, "gock"), (4, "ehur")];

const WORDS: [(&str, u32, i64); 20] = [
    ("sat", 1, 1),
    ("tap", 1, 1),
    ("pat", 1, 1),
    ("sap", 1, 1),
    ("pin", 2, 1),
    ("tin", 2, 1),
    ("man", 2, 2),
    ("dip", 2, 2),
    ("sand", 2, 3),
    ("dog", 3, 1),
    ("cat", 3, 1),
    ("kid", 3, 2),
    ("cot", 3, 2),
    ("stop", 3, 3),
    ("hen", 4, 1),
    ("sun", 4, 1),
    ("red", 4, 2),
    ("hug", 4, 2),
    ("drum", 4, 3),
    ("hunt", 4, 4),
];

const SENTENCES: [(u32, &str); 6] = [
    (1, "Pat sat."),
    (2, "Sam sat in sand."),
    (2, "Tim can dip a tin."),
    (3, "The cat and the dog nap."),
    (4, "The red hen runs in the sun."),
    (4, "Hug the pup."),
];

#[must_use]
pub fn letter_progression() -> LetterProgression {
    UNIT_LETTERS
        .iter()
        .fold(LetterProgression::new(), |letters, (unit, chars)| {
            letters.with_unit(UnitId::new(*unit), chars)
        })
}

#[must_use]
pub fn catalog() -> StaticCatalog {
    let vocabulary = WORDS
        .iter()
        .map(|(word, unit, difficulty)| {
            VocabularyEntry::new(*word, UnitId::new(*unit), Difficulty::clamped(*difficulty))
        })
        .collect();

    SENTENCES
        .iter()
        .fold(StaticCatalog::new(vocabulary), |catalog, (unit, sentence)| {
            catalog.with_sentence(UnitId::new(*unit), *sentence)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use literacy_core::model::ContentCatalog;

    #[test]
    fn every_word_is_decodable_at_its_unit() {
        let letters = letter_progression();
        for entry in catalog().vocabulary() {
            assert!(
                letters.is_decodable(&entry.word, entry.min_unit),
                "{} is not decodable at unit {}",
                entry.word,
                entry.min_unit
            );
        }
    }

    #[test]
    fn units_have_words_and_sentences() {
        let catalog = catalog();
        for unit in 1..=4 {
            let unit = UnitId::new(unit);
            assert!(!catalog.words_up_to(unit).is_empty());
            assert!(catalog.has_sentences(unit));
        }
    }
}
