// Text similarity between response bodies
// Levenshtein edit distance mapped onto a 0-100 score; a JSON mode
// neutralizes known-volatile fields so nonces alone don't sink the score.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(r#""timestamp":\d+"#).unwrap();
    static ref TIME_RE: Regex = Regex::new(r#""time":\d+"#).unwrap();
    static ref TOKEN_RE: Regex = Regex::new(r#""token":"[^"]*""#).unwrap();
    static ref CSRF_TOKEN_RE: Regex = Regex::new(r#""csrf_token":"[^"]*""#).unwrap();
}

/// Similarity of two texts as a percentage in [0, 100].
///
/// Two empty strings are identical (100); any non-empty string against an
/// empty one scores 0. Symmetric in its arguments.
pub fn score(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 100.0;
    }

    let distance = levenshtein(&a_chars, &b_chars);
    (1.0 - distance as f64 / max_len as f64) * 100.0
}

/// Similarity of two absent-able texts: a missing side scores 0.
pub fn score_opt(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => score(a, b),
        _ => 0.0,
    }
}

/// JSON-aware similarity: collapse whitespace and pin known-volatile fields
/// (timestamp, time, token, csrf_token) to constants before scoring.
pub fn score_json(a: &str, b: &str) -> f64 {
    score(&normalize_json(a), &normalize_json(b))
}

/// Pick the JSON mode when both bodies look like JSON, plain mode otherwise.
pub fn score_auto(a: &str, b: &str) -> f64 {
    if looks_like_json(a) && looks_like_json(b) {
        score_json(a, b)
    } else {
        score(a, b)
    }
}

/// `similarity >= threshold`, the single comparison rule used everywhere
pub fn meets_threshold(similarity: f64, threshold: u8) -> bool {
    similarity >= threshold as f64
}

fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn normalize_json(json: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(json, "");
    let pinned = TIMESTAMP_RE.replace_all(&collapsed, "\"timestamp\":0");
    let pinned = TIME_RE.replace_all(&pinned, "\"time\":0");
    let pinned = TOKEN_RE.replace_all(&pinned, "\"token\":\"\"");
    let pinned = CSRF_TOKEN_RE.replace_all(&pinned, "\"csrf_token\":\"\"");
    pinned.into_owned()
}

/// Classic dynamic-programming edit distance, insert/delete/substitute each
/// cost 1. Two-row rolling table over the full O(len(a)*len(b)) grid.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1) // delete
                .min(curr[j] + 1) // insert
                .min(prev[j] + cost); // substitute
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
