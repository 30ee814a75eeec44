// Credential handling for authprobe
// Applying a credential overwrites the named auth headers and nothing else;
// stripping removes the fixed set of auth-bearing headers.

use crate::models::CapturedRequest;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Headers removed for the unauthenticated-access probe
pub const AUTH_HEADERS: &[&str] = &[
    "Cookie",
    "Authorization",
    "X-Auth-Token",
    "X-CSRF-Token",
    "X-Token",
    "Auth-Token",
    "X-Access-Token",
    "X-Session-Token",
    "Authentication",
];

/// An identity the scanner can impersonate: a named bundle of Cookie,
/// Authorization, and any additional auth headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl Credential {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cookie: None,
            authorization: None,
            extra_headers: BTreeMap::new(),
        }
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    pub fn with_authorization(mut self, authorization: &str) -> Self {
        self.authorization = Some(authorization.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn has_cookie(&self) -> bool {
        self.cookie.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Substitute this identity into a copy of the request. Only the named
    /// headers are overwritten; all other request content is untouched.
    pub fn apply_to(&self, request: &CapturedRequest) -> CapturedRequest {
        let mut modified = request.clone();

        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.is_empty()) {
            modified.set_header("Cookie", cookie);
        }

        if let Some(auth) = self.authorization.as_deref().filter(|a| !a.is_empty()) {
            modified.set_header("Authorization", auth);
        }

        for (name, value) in &self.extra_headers {
            modified.set_header(name, value);
        }

        modified
    }

    /// Lift the Cookie and Authorization headers out of a captured request,
    /// e.g. to derive the baseline identity from the transcript.
    pub fn extract_from(request: &CapturedRequest, name: &str) -> Self {
        let mut credential = Credential::new(name);

        if let Some(cookie) = request.header("Cookie") {
            credential.cookie = Some(cookie.to_string());
        }
        if let Some(auth) = request.header("Authorization") {
            credential.authorization = Some(auth.to_string());
        }

        credential
    }

    /// Truncated description for log lines; never prints a full credential.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.name.clone()];

        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.is_empty()) {
            parts.push(format!("Cookie: {}", truncate(cookie, 30)));
        }
        if let Some(auth) = self.authorization.as_deref().filter(|a| !a.is_empty()) {
            parts.push(format!("Auth: {}", truncate(auth, 20)));
        }
        if let Some(subject) = self
            .authorization
            .as_deref()
            .and_then(bearer_subject)
        {
            parts.push(format!("subject: {}", subject));
        }

        parts.join(" | ")
    }
}

/// Remove every auth-bearing header from a copy of the request, for the
/// unauthenticated-access probe.
pub fn strip_auth_headers(request: &CapturedRequest) -> CapturedRequest {
    let mut modified = request.clone();
    for header in AUTH_HEADERS {
        modified.remove_header(header);
    }
    modified
}

/// Best-effort user label from a `Bearer <jwt>` authorization value: decodes
/// the payload and tries common claim names. Display only, never trusted for
/// any decision.
pub fn bearer_subject(authorization: &str) -> Option<String> {
    let token = authorization.strip_prefix("Bearer ")?.trim();

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    // JWT uses base64url encoding without padding
    let decoded = general_purpose::URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let payload: Value = serde_json::from_slice(&decoded).ok()?;

    for claim in ["userId", "user_id", "sub", "id"] {
        if let Some(value) = payload.get(claim).and_then(|v| v.as_str()) {
            return Some(value.to_string());
        }
    }

    None
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
