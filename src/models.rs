// Core data models for authprobe

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
    TRACE,
}

impl Method {
    /// Parse a method name (case-insensitive). Unknown methods are `None`;
    /// capture entries carrying them are dropped at ingestion.
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "PATCH" => Some(Method::PATCH),
            "OPTIONS" => Some(Method::OPTIONS),
            "HEAD" => Some(Method::HEAD),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::OPTIONS => write!(f, "OPTIONS"),
            Method::HEAD => write!(f, "HEAD"),
            Method::TRACE => write!(f, "TRACE"),
        }
    }
}

/// A previously captured HTTP request, as replayed by the scanner.
///
/// Header names keep their captured casing; lookups are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: Method,
    pub url: String,
    pub host: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    /// Build a request from a method name and absolute URL. Returns `None`
    /// when the method is unknown or the URL has no host.
    pub fn from_parts(
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: String,
    ) -> Option<Self> {
        let method = Method::parse(method)?;
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        let path = parsed.path().to_string();

        Some(Self {
            method,
            url: url.to_string(),
            host,
            path,
            headers,
            body,
        })
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite a header in place, appending it if absent.
    pub fn set_header(&mut self, name: &str, value: &str) {
        for (n, v) in self.headers.iter_mut() {
            if n.eq_ignore_ascii_case(name) {
                *v = value.to_string();
                return;
            }
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Remove every occurrence of a header.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// File extension of the request path, lowercased. A path whose last
    /// segment has no dot has no extension.
    pub fn file_extension(&self) -> Option<String> {
        let segment = self.path.rsplit('/').next()?;
        let (_, ext) = segment.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Short description for log lines.
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Response as observed when a request (baseline or variant) is replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ResponseRecord {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Moved-permanently / found redirects are the only ones the deny
    /// heuristics care about.
    pub fn is_redirect(&self) -> bool {
        self.status == 301 || self.status == 302
    }
}

/// Kind of authorization defect a finding reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnerabilityKind {
    PrivilegeEscalation,
    UnauthorizedAccess,
}

impl fmt::Display for VulnerabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulnerabilityKind::PrivilegeEscalation => write!(f, "PRIVILEGE_ESCALATION"),
            VulnerabilityKind::UnauthorizedAccess => write!(f, "UNAUTHORIZED_ACCESS"),
        }
    }
}

/// Risk tier of a finding. `FalsePositive` is only ever assigned by a human
/// reviewer, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Info,
    FalsePositive,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Info => write!(f, "INFO"),
            RiskLevel::FalsePositive => write!(f, "FALSE_POSITIVE"),
        }
    }
}

/// One qualifying classification. Immutable once emitted, except for the
/// reviewer-driven false-positive flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: VulnerabilityKind,
    pub risk: RiskLevel,
    pub method: Method,
    pub url: String,
    pub baseline_status: u16,
    pub variant_status: u16,
    /// Similarity between baseline and variant bodies, 0-100
    pub similarity: f64,
    /// Truncated body snapshots for display
    pub baseline_snippet: String,
    pub variant_snippet: String,
    pub baseline_credential: String,
    pub variant_credential: String,
    /// Full request pair, kept so a finding can be replayed elsewhere
    pub baseline_request: CapturedRequest,
    pub variant_request: CapturedRequest,
    pub detected_at: DateTime<Local>,
}

impl Finding {
    /// Reviewer marked this finding as noise.
    pub fn mark_false_positive(&mut self) {
        self.risk = RiskLevel::FalsePositive;
    }

    /// Status transition display text, e.g. "200 -> 200"
    pub fn status_text(&self) -> String {
        format!("{} -> {}", self.baseline_status, self.variant_status)
    }

    pub fn similarity_text(&self) -> String {
        format!("{:.1}%", self.similarity)
    }
}
