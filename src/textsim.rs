//! String similarity
//!
//! Normalized edit-distance ratio used by the similarity funnel,
//! strategy recommendation, error-record lookup, and the neighborhood
//! graph. Scores are in [0, 1] where 1.0 is an exact match.

/// Similarity ratio between two strings: `1 - edit_distance / max_len`.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let dist = levenshtein(&a_chars, &b_chars);
    1.0 - dist as f64 / max_len as f64
}

/// Two-row Levenshtein distance over chars.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(ratio("SELECT __ FROM __", "SELECT __ FROM __"), 1.0);
        assert_eq!(ratio("", ""), 1.0);
    }

    #[test]
    fn test_disjoint() {
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("", "xyz"), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // kitten -> sitting is 3 edits over max length 7
        let r = ratio("kitten", "sitting");
        assert!((r - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_symmetry_and_ordering() {
        assert_eq!(ratio("select", "selects"), ratio("selects", "select"));
        let close = ratio("how many teams", "how many team");
        let far = ratio("how many teams", "which driver won");
        assert!(close > far);
    }
}
