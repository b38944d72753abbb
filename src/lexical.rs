//! Integer-scored lexical matching.
//!
//! Two scorers live here. The form scorer ranks Paiute headwords with
//! mutually exclusive tiers over phonologically normalized strings. The text
//! scorer ranks English meanings (or sentence text) with additive phrase and
//! term bonuses. Both drop zero scores and keep input order among ties.

use crate::data::{Sentence, Word};
use crate::distance::levenshtein;
use crate::phonology::normalize;
use crate::search::Page;

const EXACT_SCORE: i64 = 1000;
const PREFIX_SCORE: i64 = 900;
const INFIX_SCORE: i64 = 700;
const FUZZY_PREFIX_SCORE: i64 = 500;
const FUZZY_PREFIX_STEP: i64 = 50;
const FUZZY_WHOLE_SCORE: i64 = 300;
const FUZZY_WHOLE_STEP: i64 = 30;

const PHRASE_BONUS: u32 = 100;
const TERM_BONUS: u32 = 10;
const BOUNDARY_BONUS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct WordHit<'a> {
    pub word: &'a Word,
    pub score: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SentenceHit<'a> {
    pub sentence: &'a Sentence,
    pub score: i64,
}

/// A Paiute query prepared once and scored against many forms.
#[derive(Debug, Clone)]
pub struct FormQuery {
    normalized: String,
    normalized_len: usize,
    max_distance: usize,
}

impl FormQuery {
    pub fn new(query: &str) -> Self {
        let normalized = normalize(query);
        let normalized_len = normalized.chars().count();
        Self {
            normalized,
            normalized_len,
            // The threshold follows the query as typed, not its normalized key.
            max_distance: (query.chars().count() / 4).max(1),
        }
    }

    /// Scores an already normalized form. Zero or below means no match.
    pub fn score_normalized(&self, form: &str) -> i64 {
        let query = self.normalized.as_str();
        let query_len = self.normalized_len;
        let mut score = 0;

        if form == query {
            score = EXACT_SCORE;
        } else if form.starts_with(query) {
            let excess = form.chars().count() - query_len;
            score = PREFIX_SCORE - excess as i64;
        } else if let Some(byte_offset) = form.find(query) {
            let offset = form[..byte_offset].chars().count();
            score = INFIX_SCORE - 2 * offset as i64;
        } else if query_len >= 3 {
            let head: String = form.chars().take(query_len).collect();
            let distance = levenshtein(query, &head);
            if distance <= self.max_distance {
                score = FUZZY_PREFIX_SCORE - FUZZY_PREFIX_STEP * distance as i64;
            }
        }

        if score == 0 && query_len >= 4 {
            let distance = levenshtein(query, form);
            if distance <= self.max_distance {
                score = FUZZY_WHOLE_SCORE - FUZZY_WHOLE_STEP * distance as i64;
            }
        }
        score
    }

    pub fn score(&self, word: &Word) -> i64 {
        self.score_normalized(&normalize(word.primary_form()))
    }
}

/// Tiered score of `word`'s primary form against `query`; 0 means no match.
pub fn score_form(word: &Word, query: &str) -> i64 {
    FormQuery::new(query).score(word).max(0)
}

pub fn search_paiute<'a, I>(words: I, query: &str, page: Page) -> Vec<WordHit<'a>>
where
    I: IntoIterator<Item = &'a Word>,
{
    let prepared = FormQuery::new(query);
    let scored = words.into_iter().map(|word| WordHit {
        word,
        score: prepared.score(word),
    });
    rank(scored, |hit| hit.score, page)
}

/// A free-text query: the whole phrase plus its whitespace-separated terms.
#[derive(Debug, Clone)]
pub struct TextQuery {
    phrase: String,
    terms: Vec<String>,
}

impl TextQuery {
    pub fn new(query: &str) -> Self {
        let phrase = query.to_lowercase();
        let terms = phrase
            .split_whitespace()
            .filter(|term| term.chars().count() > 1)
            .map(str::to_string)
            .collect();
        Self { phrase, terms }
    }

    /// Additive score over a lowercased text blob.
    pub fn score(&self, text: &str) -> u32 {
        let mut score = 0;
        if text.contains(&self.phrase) {
            score += PHRASE_BONUS;
        }
        for term in &self.terms {
            if text.contains(term.as_str()) {
                score += TERM_BONUS;
                if matches_whole_word(text, term) {
                    score += BOUNDARY_BONUS;
                }
            }
        }
        score
    }
}

/// Additive phrase/term score of a word's glosses and definitions.
pub fn score_text(word: &Word, query: &str) -> u32 {
    TextQuery::new(query).score(&word.meaning_text())
}

pub fn search_english<'a, I>(words: I, query: &str, page: Page) -> Vec<WordHit<'a>>
where
    I: IntoIterator<Item = &'a Word>,
{
    let prepared = TextQuery::new(query);
    let scored = words.into_iter().map(|word| WordHit {
        word,
        score: i64::from(prepared.score(&word.meaning_text())),
    });
    rank(scored, |hit| hit.score, page)
}

pub fn search_sentences<'a, I>(sentences: I, query: &str, page: Page) -> Vec<SentenceHit<'a>>
where
    I: IntoIterator<Item = &'a Sentence>,
{
    let prepared = TextQuery::new(query);
    let scored = sentences.into_iter().map(|sentence| SentenceHit {
        sentence,
        score: i64::from(prepared.score(&sentence.search_text())),
    });
    rank(scored, |hit| hit.score, page)
}

fn rank<T, I, F>(scored: I, score_of: F, page: Page) -> Vec<T>
where
    I: Iterator<Item = T>,
    F: Fn(&T) -> i64,
{
    let mut hits: Vec<T> = scored.filter(|hit| score_of(hit) > 0).collect();
    hits.sort_by(|a, b| score_of(b).cmp(&score_of(a)));
    page.apply(hits)
}

/// `\bterm\b` with ASCII word characters, trying every start position.
fn matches_whole_word(text: &str, term: &str) -> bool {
    let (Some(first), Some(last)) = (term.chars().next(), term.chars().next_back()) else {
        return false;
    };
    text.char_indices()
        .filter(|(start, _)| text[*start..].starts_with(term))
        .any(|(start, _)| {
            let before = text[..start].chars().next_back();
            let after = text[start + term.len()..].chars().next();
            is_boundary(before, first) && is_boundary(after, last)
        })
}

fn is_boundary(neighbour: Option<char>, edge: char) -> bool {
    neighbour.is_some_and(is_word_char) != is_word_char(edge)
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LangMap, Sense};

    fn word(id: i64, form: &str, gloss: &str) -> Word {
        let mut word = Word::new(id);
        word.forms.insert("par", form);
        let mut sense = Sense::default();
        sense.glosses = LangMap::from_iter([("en", gloss)]);
        word.senses.push(sense);
        word
    }

    fn ids(hits: &[WordHit<'_>]) -> Vec<String> {
        hits.iter().map(|hit| hit.word.id.to_string()).collect()
    }

    #[test]
    fn exact_normalized_match_scores_highest() {
        let words = [word(1, "Daka", "x")];
        assert_eq!(score_form(&words[0], "taga"), 1000);
    }

    #[test]
    fn prefix_score_shrinks_with_extra_length() {
        let short = word(1, "paavi", "lake");
        let long = word(2, "paavidu", "lakes");
        assert_eq!(score_form(&short, "paa"), 898);
        assert_eq!(score_form(&long, "paa"), 896);
    }

    #[test]
    fn infix_score_shrinks_with_offset() {
        let w = word(1, "tupaa", "x");
        assert_eq!(score_form(&w, "paa"), 700 - 4);
    }

    #[test]
    fn fuzzy_prefix_tier_compares_equal_length_head() {
        // Head "kimo" is one substitution from "kamo"; max(1, 4/4) allows one.
        let w = word(1, "kimodu", "x");
        assert_eq!(score_form(&w, "kamo"), 450);
        let longer = word(2, "nobidu", "house");
        assert_eq!(score_form(&longer, "nopitux"), 450);
        let near = word(3, "koxabi", "x");
        assert_eq!(score_form(&near, "kuxapix"), 0);
    }

    #[test]
    fn whole_form_tier_runs_when_head_misses() {
        // Head "hanxi" is two edits from "hanio"; the whole form is one insertion away.
        let w = word(1, "hanxio", "x");
        assert_eq!(score_form(&w, "hanio"), 270);
        let far = word(2, "pitsa", "x");
        assert_eq!(score_form(&far, "pitaskkk"), 0);
    }

    #[test]
    fn short_queries_skip_fuzzy_tiers() {
        let w = word(1, "xyz", "x");
        assert_eq!(score_form(&w, "ab"), 0);
    }

    #[test]
    fn formless_words_never_match() {
        let w = Word::new(9);
        assert_eq!(score_form(&w, "paa"), 0);
    }

    #[test]
    fn prefix_outranks_mid_string_match() {
        let words = vec![word(1, "tupaa", "x"), word(2, "paavi", "y")];
        let hits = search_paiute(&words, "paa", Page::new(10, 0));
        assert_eq!(ids(&hits), vec!["2", "1"]);
    }

    #[test]
    fn paa_example_orders_exact_before_extension() {
        let words = vec![word(2, "paavi", "lake"), word(1, "paa", "water")];
        let hits = search_paiute(&words, "paa", Page::new(10, 0));
        assert_eq!(ids(&hits), vec!["1", "2"]);
        assert_eq!(hits[0].score, 1000);
        let english = search_english(&words, "water", Page::new(10, 0));
        assert_eq!(ids(&english), vec!["1"]);
    }

    #[test]
    fn whole_word_terms_beat_partial_terms() {
        let words = vec![
            word(1, "a", "the watering can"),
            word(2, "b", "to water the garden"),
        ];
        let hits = search_english(&words, "water garden", Page::new(10, 0));
        assert_eq!(ids(&hits), vec!["2", "1"]);
        assert_eq!((hits[0].score, hits[1].score), (30, 10));
        let hits = search_english(&words, "water", Page::new(10, 0));
        assert_eq!(ids(&hits), vec!["2", "1"]);
        assert_eq!(hits[0].score, 115);
        assert_eq!(hits[1].score, 110);
    }

    #[test]
    fn single_letter_terms_are_ignored_but_phrase_counts() {
        let w = word(1, "a", "a big tree");
        assert_eq!(score_text(&w, "a big"), 100 + 15);
        assert_eq!(score_text(&w, "x"), 0);
    }

    #[test]
    fn boundary_check_treats_terms_literally() {
        // Same as `\b`: no boundary between a space and a bracket.
        assert!(!matches_whole_word("see (sic) here", "(sic)"));
        assert!(matches_whole_word("a(sic)b", "(sic)"));
        assert!(!matches_whole_word("classic", "sic"));
        assert!(matches_whole_word("sic transit", "sic"));
        assert!(matches_whole_word("aab aa", "aa"));
    }

    #[test]
    fn sentences_score_forms_and_translations() {
        let mut first = Sentence::new(1);
        first.forms.insert("par", "Nüü paa hibi");
        first.translations.insert("en", "I drink water");
        let mut second = Sentence::new(2);
        second.translations.insert("en", "The river is cold");
        let sentences = vec![first, second];
        let hits = search_sentences(&sentences, "water", Page::new(10, 0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sentence.id.to_string(), "1");
    }

    #[test]
    fn pagination_walks_the_full_ranking_without_gaps() {
        let words: Vec<Word> = (0..23)
            .map(|i| word(i, &format!("paa{}", "x".repeat(i as usize % 7)), "g"))
            .collect();
        let full = ids(&search_paiute(&words, "paa", Page::new(100, 0)));
        let mut walked = Vec::new();
        for skip in (0..full.len()).step_by(5) {
            walked.extend(ids(&search_paiute(&words, "paa", Page::new(5, skip))));
        }
        assert_eq!(walked, full);
    }
}
