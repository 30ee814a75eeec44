// HAR 1.2 capture parser (browser and proxy exports)

use crate::errors::ParseError;
use crate::models::CapturedRequest;
use crate::parsers::CaptureParser;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

pub struct HarParser;

impl CaptureParser for HarParser {
    fn parse(&self, path: &Path) -> Result<Vec<CapturedRequest>, ParseError> {
        let text = fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text)?;

        let entries = root
            .pointer("/log/entries")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ParseError::UnsupportedFormat("no log.entries in file".to_string()))?;

        let mut requests = Vec::new();
        for entry in entries {
            let Some(request) = entry.get("request") else {
                continue;
            };

            let method = request
                .get("method")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            let url = request
                .get("url")
                .and_then(|u| u.as_str())
                .unwrap_or_default();

            let headers = request
                .get("headers")
                .and_then(|h| h.as_array())
                .map(|headers| {
                    headers
                        .iter()
                        .filter_map(|h| {
                            let name = h.get("name")?.as_str()?;
                            let value = h.get("value")?.as_str()?;
                            Some((name.to_string(), value.to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();

            let body = request
                .pointer("/postData/text")
                .and_then(|t| t.as_str())
                .unwrap_or_default();

            match CapturedRequest::from_parts(method, url, headers, body.to_string()) {
                Some(parsed) => requests.push(parsed),
                None => debug!(method, url, "skipping malformed HAR entry"),
            }
        }

        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_har_entries() {
        let har = r#"{
            "log": {
                "version": "1.2",
                "entries": [
                    {
                        "request": {
                            "method": "GET",
                            "url": "https://app.example.com/api/users/7",
                            "headers": [
                                {"name": "Cookie", "value": "session=alice"},
                                {"name": "Accept", "value": "application/json"}
                            ]
                        }
                    },
                    {
                        "request": {
                            "method": "POST",
                            "url": "https://app.example.com/api/orders",
                            "headers": [],
                            "postData": {"mimeType": "application/json", "text": "{\"sku\":1}"}
                        }
                    }
                ]
            }
        }"#;
        let path = write_temp("authprobe_har_basic.har", har);

        let requests = HarParser.parse(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].host, "app.example.com");
        assert_eq!(requests[0].header("Cookie"), Some("session=alice"));
        assert_eq!(requests[1].body, "{\"sku\":1}");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let har = r#"{
            "log": {
                "entries": [
                    {"request": {"method": "BREW", "url": "https://a.com/x", "headers": []}},
                    {"request": {"method": "GET", "url": "no scheme", "headers": []}},
                    {"request": {"method": "GET", "url": "https://a.com/ok", "headers": []}}
                ]
            }
        }"#;
        let path = write_temp("authprobe_har_malformed.har", har);

        let requests = HarParser.parse(&path).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://a.com/ok");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_non_har_json_is_unsupported() {
        let path = write_temp("authprobe_har_nolog.json", r#"{"something": "else"}"#);
        assert!(matches!(
            HarParser.parse(&path),
            Err(ParseError::UnsupportedFormat(_))
        ));
        let _ = fs::remove_file(path);
    }
}
