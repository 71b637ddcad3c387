//! Longest-common-substring similarity.
//!
//! The sole duplicate-detection primitive: the ratio of the longest common
//! contiguous substring to the shorter input, in [0, 1]. Purely syntactic;
//! no attempt at semantic similarity.

/// Similarity of `a` and `b` as longest-common-substring length over the
/// shorter input's length, both measured in chars.
///
/// Returns 0.0 when either input is empty. Symmetric and deterministic.
pub fn score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    // Roll the DP over the shorter side to keep memory at O(min(m, n)).
    let (outer, inner) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];
    let mut longest = 0usize;

    for &oc in outer.iter() {
        for (j, &ic) in inner.iter().enumerate() {
            curr[j + 1] = if oc == ic { prev[j] + 1 } else { 0 };
            longest = longest.max(curr[j + 1]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    longest as f64 / inner.len() as f64
}
