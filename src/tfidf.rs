//! TF-IDF index over the valid-word corpus, queried by cosine similarity.
//!
//! The index is built once per loaded corpus and never updated in place.

use crate::data::RecordId;
use crate::search::{Page, Ranked, RecordKind};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

const PHRASE_BOOST: f64 = 5.0;
const LEADING_PHRASE_BOOST: f64 = 3.0;
const LEADING_TOKEN_BOOST: f64 = 2.0;

#[derive(Debug)]
struct IndexedDoc {
    id: RecordId,
    text: String,
    weights: HashMap<String, f64>,
    magnitude: f64,
}

#[derive(Debug, Default)]
pub struct TfIdfIndex {
    docs: Vec<IndexedDoc>,
    doc_freq: HashMap<String, usize>,
}

impl TfIdfIndex {
    /// Builds the index from `(id, text)` pairs. Text is lowercased here.
    pub fn build<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (RecordId, String)>,
    {
        let documents: Vec<(RecordId, String)> = documents
            .into_iter()
            .map(|(id, text)| (id, text.to_lowercase()))
            .collect();

        let term_counts: Vec<(HashMap<String, usize>, usize)> = documents
            .par_iter()
            .map(|(_, text)| {
                let tokens = tokenize(text);
                let total = tokens.len();
                let mut counts: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *counts.entry(token).or_insert(0) += 1;
                }
                (counts, total)
            })
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for (counts, _) in &term_counts {
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let doc_count = documents.len() as f64;
        let docs = documents
            .into_par_iter()
            .zip(term_counts.into_par_iter())
            .map(|((id, text), (counts, total))| {
                let weights: HashMap<String, f64> = counts
                    .into_iter()
                    .map(|(term, count)| {
                        let tf = count as f64 / total as f64;
                        let df = doc_freq.get(&term).copied().unwrap_or(1).max(1) as f64;
                        let weight = tf * (doc_count / df).ln();
                        (term, weight)
                    })
                    .collect();
                let magnitude = weights.values().map(|w| w * w).sum::<f64>().sqrt();
                IndexedDoc {
                    id,
                    text,
                    weights,
                    magnitude,
                }
            })
            .collect();

        Self { docs, doc_freq }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Corpus IDF of `term`; unseen terms weigh nothing.
    pub fn idf(&self, term: &str) -> f64 {
        match self.doc_freq.get(term) {
            Some(&df) if df > 0 => (self.docs.len() as f64 / df as f64).ln(),
            _ => 0.0,
        }
    }

    /// Ranks documents by `similarity x boost`, then applies the page window.
    pub fn search(&self, query: &str, page: Page) -> Vec<Ranked> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut query_counts: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *query_counts.entry(token.as_str()).or_insert(0) += 1;
        }
        let query_weights: Vec<(&str, f64)> = query_counts
            .into_iter()
            .map(|(term, count)| {
                let tf = count as f64 / tokens.len() as f64;
                (term, tf * self.idf(term))
            })
            .collect();
        let query_magnitude = query_weights
            .iter()
            .map(|(_, w)| w * w)
            .sum::<f64>()
            .sqrt();

        let lowered_query = query.to_lowercase();
        let mut results: Vec<Ranked> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let similarity = if query_magnitude > 0.0 && doc.magnitude > 0.0 {
                    let dot: f64 = query_weights
                        .iter()
                        .map(|(term, weight)| weight * doc.weights.get(*term).copied().unwrap_or(0.0))
                        .sum();
                    dot / (query_magnitude * doc.magnitude)
                } else {
                    0.0
                };
                let boost = boost_for(&doc.text, &lowered_query, &tokens);
                (similarity > 0.0 || boost > 1.0).then(|| Ranked {
                    id: doc.id.clone(),
                    kind: RecordKind::Word,
                    score: similarity * boost,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        page.apply(results)
    }
}

fn boost_for(text: &str, query: &str, tokens: &[String]) -> f64 {
    if text.contains(query) {
        PHRASE_BOOST
    } else if text.starts_with(query) {
        LEADING_PHRASE_BOOST
    } else if tokens.iter().any(|token| text.starts_with(token.as_str())) {
        LEADING_TOKEN_BOOST
    } else {
        1.0
    }
}

/// Lowercases, blanks out non-word characters, splits on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if is_token_char(ch) { ch } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Letters, digits and underscore in any script, plus combining diacritics so
/// that forms such as `w̃` stay in one token.
fn is_token_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ('\u{0300}'..='\u{036f}').contains(&ch)
}
