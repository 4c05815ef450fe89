//! Sequence similarity primitive.
//!
//! Ratcliff/Obershelp ratio over characters: `2*M / (len(a) + len(b))`
//! where `M` is the total length of matching blocks found by recursively
//! taking the longest common substring and matching to its left and right.

use std::collections::HashMap;

/// Longest matching block within `a[alo..ahi]` and `b[blo..bhi]`.
/// Returns (start in a, start in b, length).
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut besti = alo;
    let mut bestj = blo;
    let mut bestsize = 0usize;

    // j2len[j] = length of the longest match ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, &ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut newj2len: HashMap<usize, usize> = HashMap::new();
        for (j, &other) in b.iter().enumerate().take(bhi).skip(blo) {
            if ch != other {
                continue;
            }
            let k = if j > blo {
                j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
            } else {
                1
            };
            newj2len.insert(j, k);
            if k > bestsize {
                besti = i + 1 - k;
                bestj = j + 1 - k;
                bestsize = k;
            }
        }
        j2len = newj2len;
    }
    (besti, bestj, bestsize)
}

fn matching_total(a: &[char], b: &[char]) -> usize {
    let mut total = 0usize;
    let mut queue = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        total += size;
        queue.push((alo, i, blo, j));
        queue.push((i + size, ahi, j + size, bhi));
    }
    total
}

/// Similarity ratio in [0, 1]. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * matching_total(&a, &b) as f64 / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(sequence_ratio("optus data breach", "optus data breach"), 1.0);
        assert_eq!(sequence_ratio("", ""), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(sequence_ratio("abc", "xyz"), 0.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
    }

    #[test]
    fn ratio_is_symmetric_and_bounded() {
        let pairs = [
            ("toll group ransomware", "toll group hit by ransomware"),
            ("medibank breach", "medicare review"),
            ("a", "ab"),
        ];
        for (x, y) in pairs {
            let forward = sequence_ratio(x, y);
            let backward = sequence_ratio(y, x);
            assert!((forward - backward).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&forward));
        }
    }

    #[test]
    fn near_duplicates_score_high() {
        let ratio = sequence_ratio(
            "anz bank confirms data leak",
            "anz bank confirms data leak today",
        );
        assert!(ratio > 0.85);
    }
}
