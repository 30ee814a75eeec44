// Verdict engine for authprobe
// Turns a (baseline, variant) response pair into a verdict for one of the
// two test types. Pure functions: no I/O, no shared state.

use crate::config::ScanConfig;
use crate::models::{ResponseRecord, RiskLevel};
use crate::similarity;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FORM_TAG_RE: Regex = Regex::new(r"(?is)<form[^>]*>").unwrap();
    static ref PASSWORD_INPUT_RE: Regex =
        Regex::new(r#"(?is)type\s*=\s*["']?password["']?"#).unwrap();
    static ref KEY_VALUE_RE: Regex = Regex::new(r"(?s)\{.*:.*\}").unwrap();
}

/// Quoted keys that suggest a business-data payload
const DATA_INDICATORS: &[&str] = &["data", "result", "items", "list", "user", "id", "name"];

/// Outcome of comparing a variant response against its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The variant reached what it should not have
    Vulnerable,
    /// Apparent access control
    NotVulnerable,
    /// Ambiguous; surfaced for human review, never silently dropped
    Suspicious,
    /// Baseline itself failed, nothing to judge against
    OriginalRequestFailed,
}

/// Verdict plus the similarity that informed it, so callers never recompute
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub verdict: Verdict,
    pub similarity: f64,
}

impl Classification {
    fn new(verdict: Verdict, similarity: f64) -> Self {
        Self { verdict, similarity }
    }
}

/// Privilege-escalation test: a second identity's substituted request is
/// vulnerable when it reproduces the baseline response closely enough and
/// nothing in the variant signals a denial.
pub fn classify_privilege_escalation(
    baseline: &ResponseRecord,
    variant: &ResponseRecord,
    config: &ScanConfig,
) -> Classification {
    if baseline.status >= 400 {
        return Classification::new(Verdict::OriginalRequestFailed, 0.0);
    }

    if variant.status >= 400 {
        return Classification::new(Verdict::NotVulnerable, 0.0);
    }

    let similarity = similarity::score_auto(&baseline.body, &variant.body);
    if !similarity::meets_threshold(similarity, config.similarity_threshold) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if contains_deny_keyword(&variant.body, config) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if is_login_redirect(variant, config) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    Classification::new(Verdict::Vulnerable, similarity)
}

/// Unauthenticated-access test: with every credential stripped, a response
/// that still carries the goods (or still mirrors the baseline) is
/// vulnerable; an unclear one is only suspicious.
pub fn classify_unauthorized_access(
    baseline: &ResponseRecord,
    variant: &ResponseRecord,
    config: &ScanConfig,
) -> Classification {
    if baseline.status >= 400 {
        return Classification::new(Verdict::OriginalRequestFailed, 0.0);
    }

    let similarity = similarity::score_auto(&baseline.body, &variant.body);

    if variant.status == 401 || variant.status == 403 {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if is_login_redirect(variant, config) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if contains_deny_keyword(&variant.body, config) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if contains_login_form(&variant.body) {
        return Classification::new(Verdict::NotVulnerable, similarity);
    }

    if (200..300).contains(&variant.status) && has_business_data(&variant.body) {
        return Classification::new(Verdict::Vulnerable, similarity);
    }

    if similarity::meets_threshold(similarity, config.similarity_threshold) {
        return Classification::new(Verdict::Vulnerable, similarity);
    }

    Classification::new(Verdict::Suspicious, similarity)
}

/// Risk tier for a vulnerable privilege-escalation finding
pub fn privilege_escalation_risk(similarity: f64) -> RiskLevel {
    if similarity >= 95.0 {
        RiskLevel::High
    } else if similarity >= 85.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Body snapshot for display, truncated to `max_len` characters
pub fn response_snippet(body: &str, max_len: usize) -> String {
    if body.chars().count() <= max_len {
        return body.to_string();
    }
    let cut: String = body.chars().take(max_len).collect();
    format!("{}...", cut)
}

fn contains_deny_keyword(body: &str, config: &ScanConfig) -> bool {
    let lower = body.to_lowercase();
    config
        .deny_keywords
        .iter()
        .any(|keyword| lower.contains(&keyword.to_lowercase()))
}

fn is_login_redirect(variant: &ResponseRecord, config: &ScanConfig) -> bool {
    if !variant.is_redirect() {
        return false;
    }

    let Some(location) = variant.header("Location") else {
        return false;
    };

    let lower = location.to_lowercase();
    config
        .login_redirect_paths
        .iter()
        .any(|path| lower.contains(&path.to_lowercase()))
}

/// Login page heuristic: an HTML form plus a password-type input
fn contains_login_form(body: &str) -> bool {
    FORM_TAG_RE.is_match(body) && PASSWORD_INPUT_RE.is_match(body)
}

/// Business-data heuristic: a brace-delimited key:value structure, or one of
/// the well-known quoted keys
fn has_business_data(body: &str) -> bool {
    if KEY_VALUE_RE.is_match(body) {
        return true;
    }

    let lower = body.to_lowercase();
    DATA_INDICATORS
        .iter()
        .any(|indicator| lower.contains(&format!("\"{}\"", indicator)))
}
