// Flat JSON capture parser: one request object per line (JSON-lines), or a
// single top-level array of the same objects.

use crate::errors::ParseError;
use crate::models::CapturedRequest;
use crate::parsers::CaptureParser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawCapture {
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: String,
}

impl RawCapture {
    fn into_request(self) -> Option<CapturedRequest> {
        let headers = self.headers.into_iter().collect();
        CapturedRequest::from_parts(&self.method, &self.url, headers, self.body)
    }
}

pub struct JsonlParser;

impl CaptureParser for JsonlParser {
    fn parse(&self, path: &Path) -> Result<Vec<CapturedRequest>, ParseError> {
        let text = fs::read_to_string(path)?;

        if text.trim_start().starts_with('[') {
            let raw: Vec<RawCapture> = serde_json::from_str(&text)?;
            return Ok(raw.into_iter().filter_map(RawCapture::into_request).collect());
        }

        let mut requests = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawCapture>(line) {
                Ok(raw) => {
                    if let Some(request) = raw.into_request() {
                        requests.push(request);
                    }
                }
                Err(err) => {
                    debug!(line = number + 1, %err, "skipping malformed capture line");
                }
            }
        }

        Ok(requests)
    }
}
