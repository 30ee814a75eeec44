// Main CLI entry point for authprobe
// Uses clap for argument parsing

use authprobe::auth::Credential;
use authprobe::config::ScanConfig;
use authprobe::engine::{ScanEngine, ScanEvent};
use authprobe::executor::ReqwestExecutor;
use authprobe::models::Finding;
use authprobe::parsers::load_captures;
use authprobe::reporting::{export_csv, export_markdown};
use clap::{Arg, ArgAction, Command};
use std::fs;
use std::path::Path;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn build_command() -> Command {
    Command::new("authprobe")
        .version("0.1.0")
        .about("Replay-based authorization scanner: re-sends captured HTTP traffic under alternate identities")
        .after_help("EXAMPLES:\n  authprobe --input traffic.har --domain app.example.com --credentials users.json\n  authprobe -i captures/ -d app.example.com --threshold 90 --concurrency 10 --no-unauth-test\n\nCREDENTIALS FILE:\n  JSON array of identities: [{\"name\": \"bob\", \"cookie\": \"session=...\", \"authorization\": \"Bearer ...\"}]")
        .arg(Arg::new("input")
            .short('i')
            .long("input")
            .required(true)
            .num_args(1)
            .help("Capture file (.har, .json, .jsonl) or directory of capture files"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .num_args(1)
            .help("Scan configuration JSON file"))
        .arg(Arg::new("credentials")
            .long("credentials")
            .num_args(1)
            .help("JSON file with the test credentials to substitute"))
        .arg(Arg::new("domain")
            .short('d')
            .long("domain")
            .action(ArgAction::Append)
            .help("Target domain (repeatable); subdomains are in scope, empty means all hosts"))
        .arg(Arg::new("include_path")
            .long("include-path")
            .action(ArgAction::Append)
            .help("Path include pattern, regular expression (repeatable)"))
        .arg(Arg::new("exclude_path")
            .long("exclude-path")
            .action(ArgAction::Append)
            .help("Path exclude pattern, regular expression (repeatable)"))
        .arg(Arg::new("threshold")
            .long("threshold")
            .num_args(1)
            .value_parser(clap::value_parser!(u8))
            .help("Similarity threshold 0-100 (default 80)"))
        .arg(Arg::new("concurrency")
            .long("concurrency")
            .num_args(1)
            .value_parser(clap::value_parser!(usize))
            .help("Worker pool width 1-50 (default 5)"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .num_args(1)
            .value_parser(clap::value_parser!(u64))
            .help("Per-request timeout in seconds 1-300 (default 10)"))
        .arg(Arg::new("retries")
            .long("retries")
            .num_args(1)
            .value_parser(clap::value_parser!(u32))
            .help("Transport retries per probe 0-5 (default 1)"))
        .arg(Arg::new("no_unauth_test")
            .long("no-unauth-test")
            .action(ArgAction::SetTrue)
            .help("Skip the credential-stripped unauthenticated probe"))
        .arg(Arg::new("no_dedup")
            .long("no-dedup")
            .action(ArgAction::SetTrue)
            .help("Probe repeated (method, url) pairs instead of deduplicating"))
        .arg(Arg::new("include_static")
            .long("include-static")
            .action(ArgAction::SetTrue)
            .help("Also probe static resources (js, css, images, ...)"))
        .arg(Arg::new("csv_report")
            .long("csv-report")
            .action(ArgAction::SetTrue)
            .help("Output CSV report (default: on)"))
        .arg(Arg::new("markdown_report")
            .long("markdown-report")
            .action(ArgAction::SetTrue)
            .help("Output Markdown report (default: on)"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("authprobe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_command().get_matches();

    let input = matches.get_one::<String>("input").expect("input is required");
    let csv_report = matches.get_flag("csv_report") || !matches.get_flag("markdown_report");
    let markdown_report = matches.get_flag("markdown_report") || !matches.get_flag("csv_report");

    // Base configuration: file if given, defaults otherwise, then CLI flags
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Failed to read config file {}: {}", path, e);
                std::process::exit(2);
            });
            serde_json::from_str::<ScanConfig>(&text).unwrap_or_else(|e| {
                eprintln!("Failed to parse config file {}: {}", path, e);
                std::process::exit(2);
            })
        }
        None => ScanConfig::default(),
    };

    if let Some(domains) = matches.get_many::<String>("domain") {
        config.target_domains.extend(domains.cloned());
    }
    if let Some(patterns) = matches.get_many::<String>("include_path") {
        config.path_include_patterns.extend(patterns.cloned());
    }
    if let Some(patterns) = matches.get_many::<String>("exclude_path") {
        config.path_exclude_patterns.extend(patterns.cloned());
    }
    if let Some(&threshold) = matches.get_one::<u8>("threshold") {
        config.similarity_threshold = threshold;
    }
    if let Some(&concurrency) = matches.get_one::<usize>("concurrency") {
        config.concurrency = concurrency;
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.timeout_secs = timeout;
    }
    if let Some(&retries) = matches.get_one::<u32>("retries") {
        config.retry_count = retries;
    }
    if matches.get_flag("no_unauth_test") {
        config.test_unauthorized_access = false;
    }
    if matches.get_flag("no_dedup") {
        config.dedup_enabled = false;
    }
    if matches.get_flag("include_static") {
        config.exclude_static_resources = false;
    }

    if let Some(path) = matches.get_one::<String>("credentials") {
        let text = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Failed to read credentials file {}: {}", path, e);
            std::process::exit(2);
        });
        let credentials: Vec<Credential> = serde_json::from_str(&text).unwrap_or_else(|e| {
            eprintln!("Failed to parse credentials file {}: {}", path, e);
            std::process::exit(2);
        });
        for credential in &credentials {
            println!("Loaded credential: {}", credential.summary());
        }
        config.test_credentials.extend(credentials);
    }

    config.sanitize();

    if config.test_credentials.is_empty() && !config.test_unauthorized_access {
        eprintln!("Nothing to probe: no test credentials and the unauthenticated test is disabled.");
        std::process::exit(2);
    }

    // Load the captured transcript
    let captures = load_captures(Path::new(input)).unwrap_or_else(|e| {
        eprintln!("Failed to load captures from {}: {}", input, e);
        std::process::exit(1);
    });
    println!("Loaded {} captured request(s).", captures.len());

    let executor = ReqwestExecutor::new(config.retry_count).unwrap_or_else(|e| {
        eprintln!("Failed to build HTTP client: {}", e);
        std::process::exit(1);
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, events_tx);

    if let Err(e) = engine.start(captures) {
        eprintln!("Failed to start scan: {}", e);
        std::process::exit(1);
    }

    let mut findings: Vec<Finding> = Vec::new();
    while let Some(event) = events_rx.recv().await {
        match event {
            ScanEvent::Progress { completed, total } => {
                if completed == total || completed % 25 == 0 {
                    println!("Progress: {}/{}", completed, total);
                }
            }
            ScanEvent::Finding(finding) => {
                println!(
                    "[{}] {} {} {} ({}, similarity {})",
                    finding.risk,
                    finding.kind,
                    finding.method,
                    finding.url,
                    finding.status_text(),
                    finding.similarity_text()
                );
                findings.push(*finding);
            }
            ScanEvent::Complete => break,
        }
    }

    println!(
        "Scan complete: {} finding(s), {} unique request(s) probed.",
        findings.len(),
        engine.deduplicated_count()
    );

    // Export results
    if csv_report {
        match export_csv(&findings) {
            Ok(filename) => println!("CSV report written to {}", filename),
            Err(e) => eprintln!("Failed to write CSV report: {}", e),
        }
    }
    if markdown_report {
        match export_markdown(&findings) {
            Ok(filename) => println!("Markdown report written to {}", filename),
            Err(e) => eprintln!("Failed to write Markdown report: {}", e),
        }
    }
}
