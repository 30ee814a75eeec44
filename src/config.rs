// Scan configuration: a plain value object, no file I/O in the core.
// Out-of-range numeric settings clamp to their bounds instead of erroring.

use crate::auth::Credential;
use crate::models::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bounds for the clamped numeric settings
pub const THRESHOLD_RANGE: (u8, u8) = (0, 100);
pub const CONCURRENCY_RANGE: (usize, usize) = (1, 50);
pub const TIMEOUT_RANGE: (u64, u64) = (1, 300);
pub const RETRY_RANGE: (u32, u32) = (0, 5);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    // ---- target selection ----
    /// Hosts in scope; empty matches every host
    pub target_domains: Vec<String>,
    /// Path include patterns (regular expressions, full-path match)
    pub path_include_patterns: Vec<String>,
    /// Path exclude patterns (regular expressions, full-path match)
    pub path_exclude_patterns: Vec<String>,

    // ---- identities ----
    /// Baseline identity; auto-derived from the transcript when absent
    pub baseline_credential: Option<Credential>,
    /// Identities substituted into privilege-escalation probes
    pub test_credentials: Vec<Credential>,
    /// Also probe each request with all credentials stripped
    pub test_unauthorized_access: bool,

    // ---- detection ----
    /// Similarity threshold, 0-100
    pub similarity_threshold: u8,
    /// Worker pool width, 1-50
    pub concurrency: usize,
    /// Per-request timeout in seconds, 1-300
    pub timeout_secs: u64,
    /// Transport retry count per probe, 0-5
    pub retry_count: u32,

    // ---- filtering ----
    pub exclude_static_resources: bool,
    pub static_extensions: HashSet<String>,
    /// Skip (method, url) pairs already probed this run
    pub dedup_enabled: bool,
    /// Methods to probe; empty means all not otherwise excluded
    pub include_methods: HashSet<Method>,
    pub exclude_methods: HashSet<Method>,

    // ---- verdict heuristics ----
    /// Case-insensitive substrings that mark an access-denied page
    pub deny_keywords: Vec<String>,
    /// Location-header substrings that mark a login redirect
    pub login_redirect_paths: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_domains: Vec::new(),
            path_include_patterns: Vec::new(),
            path_exclude_patterns: Vec::new(),
            baseline_credential: None,
            test_credentials: Vec::new(),
            test_unauthorized_access: true,
            similarity_threshold: 80,
            concurrency: 5,
            timeout_secs: 10,
            retry_count: 1,
            exclude_static_resources: true,
            static_extensions: [
                "js", "css", "png", "jpg", "jpeg", "gif", "ico", "woff", "woff2", "ttf", "svg",
                "mp4", "mp3",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            dedup_enabled: true,
            include_methods: HashSet::new(),
            exclude_methods: [Method::OPTIONS, Method::HEAD, Method::TRACE]
                .into_iter()
                .collect(),
            deny_keywords: [
                "unauthorized",
                "forbidden",
                "access denied",
                "permission denied",
                "login required",
                "authentication required",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            login_redirect_paths: ["/login", "/signin", "/auth/login", "/auth/signin", "/sso/login"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp every numeric setting into its documented range and lowercase
    /// the static-extension set. The engine applies this once at run start,
    /// so hand-built or deserialized configs never bypass the bounds.
    pub fn sanitize(&mut self) {
        self.similarity_threshold = self
            .similarity_threshold
            .clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
        self.concurrency = self.concurrency.clamp(CONCURRENCY_RANGE.0, CONCURRENCY_RANGE.1);
        self.timeout_secs = self.timeout_secs.clamp(TIMEOUT_RANGE.0, TIMEOUT_RANGE.1);
        self.retry_count = self.retry_count.clamp(RETRY_RANGE.0, RETRY_RANGE.1);
        self.static_extensions = self
            .static_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    pub fn with_target_domain(mut self, domain: &str) -> Self {
        self.target_domains.push(domain.to_string());
        self
    }

    pub fn with_test_credential(mut self, credential: Credential) -> Self {
        self.test_credentials.push(credential);
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: u8) -> Self {
        self.similarity_threshold = threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(CONCURRENCY_RANGE.0, CONCURRENCY_RANGE.1);
        self
    }
}

/// Host is in scope when it equals a configured domain or is a subdomain of
/// one; an empty domain list accepts every host. Shared by the request
/// filter and baseline-credential extraction.
pub fn matches_target_domain(host: &str, domains: &[String]) -> bool {
    if domains.is_empty() {
        return true;
    }

    domains
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
}
