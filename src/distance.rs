/// Levenshtein distance over Unicode scalar values, unit cost for every edit.
///
/// Always fills the whole `(|b|+1) x (|a|+1)` table; callers compare the raw
/// value against their own thresholds, so no early exit.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let width = a.len() + 1;
    let mut matrix = vec![0usize; width * (b.len() + 1)];

    for (j, cell) in matrix.iter_mut().take(width).enumerate() {
        *cell = j;
    }
    for i in 1..=b.len() {
        matrix[i * width] = i;
        for j in 1..=a.len() {
            let here = i * width + j;
            matrix[here] = if b[i - 1] == a[j - 1] {
                matrix[here - width - 1]
            } else {
                1 + matrix[here - width - 1]
                    .min(matrix[here - 1])
                    .min(matrix[here - width])
            };
        }
    }
    matrix[b.len() * width + a.len()]
}

/// Suggestion test used by the client: substring containment, or a
/// normalized edit similarity of at least `threshold`.
pub fn fuzzy_match(query: &str, text: &str, threshold: f64) -> bool {
    let query = query.to_lowercase();
    let text = text.to_lowercase();
    if text.contains(&query) {
        return true;
    }
    let longest = query.chars().count().max(text.chars().count());
    if longest == 0 {
        return true;
    }
    let similarity = 1.0 - levenshtein(&query, &text) as f64 / longest as f64;
    similarity >= threshold
}

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classic_examples() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("pü", "pu"), 1);
    }

    #[test]
    fn fuzzy_match_accepts_substrings_and_near_misses() {
        assert!(fuzzy_match("wat", "Water", DEFAULT_FUZZY_THRESHOLD));
        assert!(fuzzy_match("watr", "water", DEFAULT_FUZZY_THRESHOLD));
        assert!(!fuzzy_match("stone", "water", DEFAULT_FUZZY_THRESHOLD));
    }

    proptest! {
        #[test]
        fn distance_to_self_is_zero(s in "\\PC{0,12}") {
            prop_assert_eq!(levenshtein(&s, &s), 0);
        }

        #[test]
        fn distance_is_symmetric(a in "[a-e]{0,10}", b in "[a-e]{0,10}") {
            prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        }

        #[test]
        fn distance_from_empty_is_length(s in "\\PC{0,12}") {
            prop_assert_eq!(levenshtein("", &s), s.chars().count());
        }

        #[test]
        fn distance_is_bounded_by_longer_input(a in "[a-c]{0,8}", b in "[a-c]{0,8}") {
            let bound = a.chars().count().max(b.chars().count());
            prop_assert!(levenshtein(&a, &b) <= bound);
        }
    }
}
