//! Matching rubric rows to inventory applications by name.
//!
//! Rubric sheets are maintained by hand, so names drift ("Zoom" vs
//! "Zoom Video Communications"). A candidate matches on exact
//! case-insensitive equality, then containment, then a Ratcliff/Obershelp
//! similarity ratio above the threshold.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;
/// Names this short only match exactly.
const MIN_CONTAINMENT_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Contains,
    Similar { ratio: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameMatch {
    pub index: usize,
    pub kind: MatchKind,
}

/// Finds the rubric candidate for `name`. Exact matches win over any
/// earlier fuzzy candidate; fuzzy rules are tried per candidate in order.
pub fn find_match<S: AsRef<str>>(name: &str, candidates: &[S], threshold: f64) -> Option<NameMatch> {
    let clean = name.trim().trim_matches('"').trim();
    let lowered = clean.to_lowercase();

    if let Some(index) = candidates
        .iter()
        .position(|c| c.as_ref().trim().to_lowercase() == lowered)
    {
        return Some(NameMatch { index, kind: MatchKind::Exact });
    }

    for (index, candidate) in candidates.iter().enumerate() {
        let candidate = candidate.as_ref().trim();
        let other = candidate.to_lowercase();

        if (lowered.contains(&other) || other.contains(&lowered))
            && clean.chars().count() > MIN_CONTAINMENT_LEN
            && candidate.chars().count() > MIN_CONTAINMENT_LEN
        {
            return Some(NameMatch { index, kind: MatchKind::Contains });
        }

        let ratio = similarity(&lowered, &other);
        if ratio > threshold {
            return Some(NameMatch { index, kind: MatchKind::Similar { ratio } });
        }
    }
    None
}

/// `2 * M / T`, where M is the number of characters in the recursively
/// found longest common blocks and T the combined length. Two empty
/// strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring, earliest in `a` then earliest in `b` on ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            row[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let run = row[j + 1];
            if run > best.2 {
                best = (i + 1 - run, j + 1 - run, run);
            }
        }
        std::mem::swap(&mut prev, &mut row);
    }
    best
}
