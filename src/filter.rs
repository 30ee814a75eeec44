// Request eligibility gate and dedup ledger
// Checks short-circuit in a fixed order; the ledger is only written once
// every check has passed, so a rejected request leaves no trace.

use crate::config::{matches_target_domain, ScanConfig};
use crate::models::CapturedRequest;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

pub struct RequestFilter {
    config: ScanConfig,
    /// Include/exclude patterns compiled once; invalid patterns are dropped,
    /// which makes them behave as non-matching
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
    /// Whether the include list was configured at all (an all-invalid list
    /// still rejects everything)
    include_configured: bool,
    /// (method, url) keys probed this run
    tested: Mutex<HashSet<String>>,
}

impl RequestFilter {
    pub fn new(config: ScanConfig) -> Self {
        let include_configured = !config.path_include_patterns.is_empty();
        let include_patterns = compile_patterns(&config.path_include_patterns);
        let exclude_patterns = compile_patterns(&config.path_exclude_patterns);

        Self {
            config,
            include_patterns,
            exclude_patterns,
            include_configured,
            tested: Mutex::new(HashSet::new()),
        }
    }

    /// Decide whether a captured request gets probed. Ordering matters:
    /// dedup, domain, method, static resource, include paths, exclude paths,
    /// and only then the ledger insertion.
    pub fn should_scan(&self, request: &CapturedRequest) -> bool {
        let key = url_key(request);

        if self.config.dedup_enabled {
            let tested = self.tested.lock().unwrap_or_else(|e| e.into_inner());
            if tested.contains(&key) {
                return false;
            }
        }

        if !matches_target_domain(&request.host, &self.config.target_domains) {
            return false;
        }

        if !self.matches_method(request) {
            return false;
        }

        if self.config.exclude_static_resources && self.is_static_resource(request) {
            return false;
        }

        if !self.matches_include_patterns(request) {
            return false;
        }

        if self.matches_exclude_patterns(request) {
            return false;
        }

        if self.config.dedup_enabled {
            let mut tested = self.tested.lock().unwrap_or_else(|e| e.into_inner());
            tested.insert(key);
        }

        debug!(request = %request.summary(), "eligible for probing");
        true
    }

    fn matches_method(&self, request: &CapturedRequest) -> bool {
        if self.config.exclude_methods.contains(&request.method) {
            return false;
        }

        if !self.config.include_methods.is_empty()
            && !self.config.include_methods.contains(&request.method)
        {
            return false;
        }

        true
    }

    /// A request with no file extension is never treated as static
    fn is_static_resource(&self, request: &CapturedRequest) -> bool {
        match request.file_extension() {
            Some(ext) => self.config.static_extensions.contains(&ext),
            None => false,
        }
    }

    fn matches_include_patterns(&self, request: &CapturedRequest) -> bool {
        if !self.include_configured {
            return true;
        }

        self.include_patterns
            .iter()
            .any(|p| p.is_match(&request.path))
    }

    fn matches_exclude_patterns(&self, request: &CapturedRequest) -> bool {
        self.exclude_patterns
            .iter()
            .any(|p| p.is_match(&request.path))
    }

    /// Forget every probed (method, url) key, for the next run
    pub fn reset(&self) {
        self.tested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn deduplicated_count(&self) -> usize {
        self.tested.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Dedup key includes the full URL, so differing query strings stay distinct
fn url_key(request: &CapturedRequest) -> String {
    format!("{}:{}", request.method, request.url)
}

/// Patterns match the whole path, and a pattern that fails to compile simply
/// never matches.
fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => Some(re),
            Err(err) => {
                debug!(pattern = %pattern, %err, "ignoring invalid path pattern");
                None
            }
        })
        .collect()
}
