// Report export for authprobe findings
// CSV and Markdown, written next to the working directory with timestamped
// filenames.

use crate::models::Finding;
use chrono::Local;
use std::fs::File;
use std::io::Write;

/// Escape CSV field to prevent formula injection attacks
/// Cells starting with =, +, -, @, or tab are prefixed with single quote
fn escape_csv_field(field: &str) -> String {
    if field.is_empty() {
        return String::new();
    }

    let first_char = field.chars().next().unwrap();
    let needs_escaping = matches!(first_char, '=' | '+' | '-' | '@' | '\t');

    // Also escape if field contains comma, quotes, or newlines
    if needs_escaping || field.contains(',') || field.contains('"') || field.contains('\n') {
        if needs_escaping {
            // Prefix with single quote to prevent formula injection
            format!("\"'{}\"", field.replace('"', "\"\""))
        } else {
            // Standard CSV escaping
            format!("\"{}\"", field.replace('"', "\"\""))
        }
    } else {
        field.to_string()
    }
}

pub fn export_csv(findings: &[Finding]) -> Result<String, std::io::Error> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("authprobe_report_{}.csv", timestamp);
    let mut file = File::create(&filename)?;

    writeln!(
        file,
        "Kind,Risk,Method,URL,Baseline Status,Variant Status,Similarity,Baseline Credential,Variant Credential,Detected At"
    )?;
    for finding in findings {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{}",
            escape_csv_field(&finding.kind.to_string()),
            escape_csv_field(&finding.risk.to_string()),
            escape_csv_field(&finding.method.to_string()),
            escape_csv_field(&finding.url),
            finding.baseline_status,
            finding.variant_status,
            escape_csv_field(&finding.similarity_text()),
            escape_csv_field(&finding.baseline_credential),
            escape_csv_field(&finding.variant_credential),
            escape_csv_field(&finding.detected_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        )?;
    }

    Ok(filename)
}

pub fn export_markdown(findings: &[Finding]) -> Result<String, std::io::Error> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("authprobe_report_{}.md", timestamp);
    let mut file = File::create(&filename)?;

    writeln!(file, "# Authprobe Report\n")?;
    writeln!(file, "{} finding(s)\n", findings.len())?;

    for finding in findings {
        writeln!(
            file,
            "## [{}] {} {} {}\n",
            finding.risk, finding.kind, finding.method, finding.url
        )?;
        writeln!(
            file,
            "- Status: {} | Similarity: {}",
            finding.status_text(),
            finding.similarity_text()
        )?;
        writeln!(
            file,
            "- Credentials: `{}` -> `{}`\n",
            finding.baseline_credential, finding.variant_credential
        )?;
    }

    Ok(filename)
}
