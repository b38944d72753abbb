//! Linear fusion of TF-IDF and semantic rankings.

use crate::data::RecordId;
use crate::search::{Ranked, RecordKind};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Divisor floor when normalizing TF-IDF scores.
const NORMALIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub semantic: f64,
    pub tfidf: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            tfidf: 0.4,
        }
    }
}

/// Combines both rankings into `semantic * w_s + tfidf / max_tfidf * w_t`.
///
/// `semantic` is `None` when the semantic engine is not ready; the lexical
/// ranking is then returned as is, truncated to `limit`. Records present on
/// only one side get 0 for the other.
pub fn fuse(
    lexical: &[Ranked],
    semantic: Option<&[Ranked]>,
    weights: FusionWeights,
    limit: usize,
) -> Vec<Ranked> {
    let Some(semantic) = semantic else {
        return lexical.iter().take(limit).cloned().collect();
    };

    let max_tfidf = lexical
        .iter()
        .map(|ranked| ranked.score)
        .fold(0.0f64, f64::max)
        .max(NORMALIZE_EPSILON);

    let mut fused: Vec<Ranked> = Vec::with_capacity(lexical.len() + semantic.len());
    let mut slots: HashMap<(RecordKind, &RecordId), usize> = HashMap::new();

    for ranked in semantic {
        let slot = *slots.entry((ranked.kind, &ranked.id)).or_insert_with(|| {
            fused.push(Ranked {
                score: 0.0,
                ..ranked.clone()
            });
            fused.len() - 1
        });
        fused[slot].score += ranked.score * weights.semantic;
    }
    for ranked in lexical {
        let slot = *slots.entry((ranked.kind, &ranked.id)).or_insert_with(|| {
            fused.push(Ranked {
                score: 0.0,
                ..ranked.clone()
            });
            fused.len() - 1
        });
        fused[slot].score += ranked.score / max_tfidf * weights.tfidf;
    }

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(id: i64, score: f64) -> Ranked {
        Ranked {
            id: RecordId::Num(id),
            kind: RecordKind::Word,
            score,
        }
    }

    fn ids(results: &[Ranked]) -> Vec<i64> {
        results
            .iter()
            .map(|r| match r.id {
                RecordId::Num(id) => id,
                RecordId::Text(_) => -1,
            })
            .collect()
    }

    #[test]
    fn not_ready_returns_lexical_unchanged() {
        let lexical = vec![ranked(1, 7.5), ranked(2, 3.0), ranked(3, 1.0)];
        let fused = fuse(&lexical, None, FusionWeights::default(), 2);
        assert_eq!(fused, lexical[..2].to_vec());
    }

    #[test]
    fn scores_combine_with_default_weights() {
        let lexical = vec![ranked(1, 4.0), ranked(2, 2.0)];
        let semantic = vec![ranked(2, 0.9), ranked(3, 0.5)];
        let fused = fuse(&lexical, Some(&semantic), FusionWeights::default(), 10);
        // 2: 0.54 + 0.2, 1: 0.4, 3: 0.3
        assert_eq!(ids(&fused), vec![2, 1, 3]);
        assert!((fused[0].score - 0.74).abs() < 1e-9);
        assert!((fused[1].score - 0.4).abs() < 1e-9);
        assert!((fused[2].score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn zero_lexical_scores_do_not_divide_by_zero() {
        let lexical = vec![ranked(1, 0.0)];
        let semantic = vec![ranked(2, 0.4)];
        let fused = fuse(&lexical, Some(&semantic), FusionWeights::default(), 10);
        assert_eq!(ids(&fused), vec![2, 1]);
        assert!(fused.iter().all(|r| r.score.is_finite()));
    }

    #[test]
    fn ties_keep_semantic_then_lexical_order() {
        let lexical = vec![ranked(5, 1.0)];
        let semantic = vec![ranked(4, 0.4), ranked(6, 0.4)];
        let weights = FusionWeights {
            semantic: 1.0,
            tfidf: 0.4,
        };
        let fused = fuse(&lexical, Some(&semantic), weights, 10);
        assert_eq!(ids(&fused), vec![4, 6, 5]);
    }

    #[test]
    fn sentences_and_words_with_equal_ids_stay_apart() {
        let semantic = vec![
            ranked(1, 0.5),
            Ranked {
                id: RecordId::Num(1),
                kind: RecordKind::Sentence,
                score: 0.5,
            },
        ];
        let fused = fuse(&[], Some(&semantic), FusionWeights::default(), 10);
        assert_eq!(fused.len(), 2);
    }
}
