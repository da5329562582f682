/// Longest common subsequence length over Unicode scalar values, using the
/// two-row O(min(m,n)) space algorithm.
pub fn lcs_len(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let n = b.len();
    if n == 0 {
        return 0;
    }

    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];

    for &ca in &a {
        for j in 1..=n {
            curr[j] = if ca == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalised indel similarity in `[0.0, 1.0]`: `2·LCS / (len_a + len_b)`.
pub fn ratio(s1: &str, s2: &str) -> f64 {
    let total = s1.chars().count() + s2.chars().count();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(s1, s2)) as f64 / total as f64
}

/// [`ratio`] after sorting whitespace-separated tokens, so word order does
/// not matter. Case is significant.
pub fn token_sort_ratio(s1: &str, s2: &str) -> f64 {
    ratio(&sorted_tokens(s1), &sorted_tokens(s2))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
