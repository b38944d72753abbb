//! Alphabetical browsing and the discovery endpoints (random, word of the day).

use crate::data::{Sentence, Word};
use crate::search::Page;
use crate::store::Corpus;
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bucket for forms that contain no ASCII letter.
pub const NON_LETTER: char = '#';

/// First ASCII letter of `text`, uppercased.
pub fn first_letter(text: &str) -> char {
    text.chars()
        .find(char::is_ascii_alphabetic)
        .map(|ch| ch.to_ascii_uppercase())
        .unwrap_or(NON_LETTER)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LetterCount {
    pub letter: char,
    pub count: usize,
}

impl Corpus {
    /// Valid words sorted by lowercased primary form, optionally restricted to
    /// one letter bucket.
    pub fn browse(&self, letter: Option<&str>, page: Page) -> Vec<&Word> {
        let wanted = letter.map(str::to_uppercase);
        let mut words: Vec<&Word> = self
            .valid_words()
            .filter(|word| match &wanted {
                Some(wanted) => wanted.chars().eq([first_letter(word.primary_form())]),
                None => true,
            })
            .collect();
        words.sort_by_cached_key(|word| word.primary_form().to_lowercase());
        page.apply(words)
    }

    pub fn letter_counts(&self) -> Vec<LetterCount> {
        let mut counts: BTreeMap<char, usize> = BTreeMap::new();
        for word in self.valid_words() {
            *counts.entry(first_letter(word.primary_form())).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(letter, count)| LetterCount { letter, count })
            .collect()
    }

    pub fn random_word<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Word> {
        match self.valid_word_count() {
            0 => None,
            count => self.valid_word_at(rng.gen_range(0..count)),
        }
    }

    pub fn random_sentence<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Sentence> {
        match self.sentences().len() {
            0 => None,
            count => self.sentences().get(rng.gen_range(0..count)),
        }
    }

    /// Deterministic pick for `date`: `(year * 1000 + day_of_year) % pool`,
    /// where the pool is the valid words with examples, or every valid word
    /// when none has examples.
    pub fn word_of_the_day(&self, date: NaiveDate) -> Option<&Word> {
        let with_examples: Vec<&Word> = self.valid_words().filter(|w| w.has_examples()).collect();
        let pool = if with_examples.is_empty() {
            self.valid_words().collect()
        } else {
            with_examples
        };
        if pool.is_empty() {
            return None;
        }
        let seed = i64::from(date.year()) * 1000 + i64::from(date.ordinal());
        let index = seed.rem_euclid(pool.len() as i64) as usize;
        pool.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Example, LangMap, Sense};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn word(id: i64, form: &str, with_example: bool) -> Word {
        let mut word = Word::new(id);
        word.forms.insert("par", form);
        let mut sense = Sense::default();
        sense.glosses = LangMap::from_iter([("en", "gloss")]);
        if with_example {
            sense.examples.push(Example::default());
        }
        word.senses.push(sense);
        word
    }

    fn corpus() -> Corpus {
        let mut invalid = Word::new(99);
        invalid.forms.insert("par", "aaa");
        let mut sentence = Sentence::new(50);
        sentence.forms.insert("par", "paa hibi");
        Corpus::new(
            vec![
                word(1, "Tuba", false),
                word(2, "paa", true),
                word(3, "'atsa", false),
                word(4, "Paavi", true),
                word(5, "ü", false),
                invalid,
            ],
            vec![sentence],
        )
    }

    fn ids(words: &[&Word]) -> Vec<String> {
        words.iter().map(|w| w.id.to_string()).collect()
    }

    #[test]
    fn first_letter_skips_leading_punctuation() {
        assert_eq!(first_letter("'atsa"), 'A');
        assert_eq!(first_letter("ü"), NON_LETTER);
        assert_eq!(first_letter(""), NON_LETTER);
    }

    #[test]
    fn browse_sorts_case_insensitively_and_filters_by_letter() {
        let corpus = corpus();
        assert_eq!(
            ids(&corpus.browse(None, Page::new(50, 0))),
            vec!["3", "2", "4", "1", "5"]
        );
        assert_eq!(ids(&corpus.browse(Some("p"), Page::new(50, 0))), vec!["2", "4"]);
        assert_eq!(ids(&corpus.browse(Some("P"), Page::new(1, 1))), vec!["4"]);
        assert!(corpus.browse(Some("pa"), Page::new(50, 0)).is_empty());
    }

    #[test]
    fn letter_counts_cover_valid_words_only() {
        let counts = corpus().letter_counts();
        let expected = vec![
            LetterCount { letter: '#', count: 1 },
            LetterCount { letter: 'A', count: 1 },
            LetterCount { letter: 'P', count: 2 },
            LetterCount { letter: 'T', count: 1 },
        ];
        assert_eq!(counts, expected);
    }

    #[test]
    fn random_picks_come_from_valid_words() {
        let corpus = corpus();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(corpus.random_word(&mut rng).unwrap().is_valid());
        }
        assert_eq!(corpus.random_sentence(&mut rng).unwrap().id.to_string(), "50");
        let empty = Corpus::new(Vec::new(), Vec::new());
        assert!(empty.random_word(&mut rng).is_none());
        assert!(empty.random_sentence(&mut rng).is_none());
    }

    #[test]
    fn word_of_the_day_prefers_words_with_examples() {
        let corpus = corpus();
        // 2024-01-01: seed 2_024_001, pool [2, 4], index 1.
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(corpus.word_of_the_day(date).unwrap().id.to_string(), "4");
        let next = date.succ_opt().unwrap();
        assert_eq!(corpus.word_of_the_day(next).unwrap().id.to_string(), "2");

        let plain = Corpus::new(vec![word(1, "a", false), word(2, "b", false), word(3, "c", false)], Vec::new());
        // 2_024_001 % 3 == 0
        assert_eq!(plain.word_of_the_day(date).unwrap().id.to_string(), "1");
        assert!(Corpus::new(Vec::new(), Vec::new()).word_of_the_day(date).is_none());
    }
}
