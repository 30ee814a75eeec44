// Capture-log ingestion for authprobe
// Each parser turns one on-disk capture format into replayable requests.

pub mod har;
pub mod jsonl;

pub use har::HarParser;
pub use jsonl::JsonlParser;

use crate::errors::ParseError;
use crate::models::CapturedRequest;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Parses one capture-log format into captured requests
pub trait CaptureParser {
    fn parse(&self, path: &Path) -> Result<Vec<CapturedRequest>, ParseError>;
}

/// Load captures from a single file, or from every recognizable capture file
/// under a directory.
pub fn load_captures(input: &Path) -> Result<Vec<CapturedRequest>, ParseError> {
    if !input.is_dir() {
        return parse_file(input);
    }

    let mut requests = Vec::new();
    for entry in WalkDir::new(input).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        match parse_file(entry.path()) {
            Ok(mut parsed) => requests.append(&mut parsed),
            // unrelated files in the tree are not an error
            Err(ParseError::UnsupportedFormat(_)) => continue,
            Err(err) => {
                warn!(file = %entry.path().display(), %err, "skipping unreadable capture file");
            }
        }
    }

    if requests.is_empty() {
        return Err(ParseError::Empty(input.display().to_string()));
    }
    Ok(requests)
}

fn parse_file(path: &Path) -> Result<Vec<CapturedRequest>, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "har" => HarParser.parse(path),
        "jsonl" | "ndjson" => JsonlParser.parse(path),
        // a bare .json could be a HAR export or a flat request array; try
        // HAR first and fall back
        "json" => match HarParser.parse(path) {
            Ok(requests) if !requests.is_empty() => Ok(requests),
            _ => JsonlParser.parse(path),
        },
        other => Err(ParseError::UnsupportedFormat(other.to_string())),
    }
}
