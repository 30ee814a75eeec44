/// Integration tests for the scan engine
/// Drives full runs against a scripted in-memory executor

use authprobe::auth::Credential;
use authprobe::config::ScanConfig;
use authprobe::engine::{RequestSource, ScanEngine, ScanEvent, ScanState};
use authprobe::errors::{ExecutorError, ScanError};
use authprobe::executor::HttpExecutor;
use authprobe::models::{CapturedRequest, Finding, ResponseRecord, RiskLevel, VulnerabilityKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Executor that answers from a fixed routing closure, with an optional
/// artificial delay to keep a run alive while the test pokes at the engine
struct ScriptedExecutor<F> {
    handler: F,
    delay: Duration,
}

impl<F> ScriptedExecutor<F>
where
    F: Fn(&CapturedRequest) -> Result<ResponseRecord, ExecutorError> + Send + Sync + 'static,
{
    fn new(handler: F) -> Self {
        Self {
            handler,
            delay: Duration::ZERO,
        }
    }

    fn with_delay(handler: F, delay: Duration) -> Self {
        Self { handler, delay }
    }
}

impl<F> HttpExecutor for ScriptedExecutor<F>
where
    F: Fn(&CapturedRequest) -> Result<ResponseRecord, ExecutorError> + Send + Sync + 'static,
{
    async fn send(
        &self,
        request: &CapturedRequest,
        _timeout: Duration,
    ) -> Result<ResponseRecord, ExecutorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(request)
    }
}

struct FailingSource;

impl RequestSource for FailingSource {
    fn transactions(&self) -> Result<Vec<CapturedRequest>, ScanError> {
        Err(ScanError::Enumeration("history store unavailable".into()))
    }
}

fn captured(url: &str, cookie: Option<&str>) -> CapturedRequest {
    let headers = cookie
        .map(|c| vec![("Cookie".to_string(), c.to_string())])
        .unwrap_or_default();
    CapturedRequest::from_parts("GET", url, headers, String::new()).unwrap()
}

fn base_config() -> ScanConfig {
    ScanConfig::default()
        .with_target_domain("app.test")
        .with_test_credential(Credential::new("bob").with_cookie("session=bob"))
}

fn json_response(status: u16, body: &str) -> Result<ResponseRecord, ExecutorError> {
    Ok(ResponseRecord::new(status, vec![], body))
}

/// Drain events until Complete, returning findings and the last progress pair
async fn drain(
    rx: &mut mpsc::UnboundedReceiver<ScanEvent>,
) -> (Vec<Finding>, Option<(usize, usize)>, usize) {
    let mut findings = Vec::new();
    let mut last_progress = None;
    let mut completes = 0;

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::Progress { completed, total } => {
                if let Some((previous, _)) = last_progress {
                    assert!(completed > previous, "progress must increase monotonically");
                }
                last_progress = Some((completed, total));
            }
            ScanEvent::Finding(finding) => findings.push(*finding),
            ScanEvent::Complete => {
                completes += 1;
                break;
            }
        }
    }

    (findings, last_progress, completes)
}

#[tokio::test]
async fn test_privilege_escalation_detected_high_risk() {
    let body = "{\"id\":1,\"name\":\"A\"}";
    let executor = ScriptedExecutor::new(move |request| match request.header("Cookie") {
        Some("session=alice") => json_response(200, body),
        Some("session=bob") => json_response(200, body),
        _ => json_response(401, "unauthorized"),
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine
        .start(vec![captured("https://app.test/api/profile", Some("session=alice"))])
        .unwrap();

    let (findings, progress, completes) = drain(&mut rx).await;

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.kind, VulnerabilityKind::PrivilegeEscalation);
    assert_eq!(finding.risk, RiskLevel::High);
    assert_eq!(finding.similarity, 100.0);
    assert_eq!(finding.baseline_status, 200);
    assert_eq!(finding.variant_status, 200);
    assert_eq!(finding.variant_credential, "bob");
    // the baseline identity was derived from the transcript's cookie
    assert_eq!(finding.baseline_credential, "baseline");
    // the replayable variant request carries the substituted cookie
    assert_eq!(finding.variant_request.header("Cookie"), Some("session=bob"));

    // two units: credential probe + unauthenticated probe
    assert_eq!(progress, Some((2, 2)));
    assert_eq!(completes, 1);
    assert_eq!(engine.state(), ScanState::Completed);
    assert_eq!(engine.findings().len(), 1);
}

#[tokio::test]
async fn test_unauthenticated_access_with_business_data() {
    let executor = ScriptedExecutor::new(|request| match request.header("Cookie") {
        Some(_) => json_response(200, "{\"data\": {\"balance\": 100}}"),
        // stripped probe still gets the data back
        None => json_response(200, "{\"data\": {\"balance\": 100}}"),
    });

    let mut config = ScanConfig::default().with_target_domain("app.test");
    config.test_unauthorized_access = true;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/account", Some("session=alice"))])
        .unwrap();

    let (findings, progress, _) = drain(&mut rx).await;

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, VulnerabilityKind::UnauthorizedAccess);
    assert_eq!(findings[0].risk, RiskLevel::High);
    assert_eq!(findings[0].variant_credential, "unauthenticated");
    assert!(findings[0].variant_request.header("Cookie").is_none());
    assert_eq!(progress, Some((1, 1)));
}

#[tokio::test]
async fn test_unauthenticated_denied_produces_no_finding() {
    let executor = ScriptedExecutor::new(|request| match request.header("Cookie") {
        Some(_) => json_response(200, "OK"),
        None => json_response(401, ""),
    });

    let config = ScanConfig::default().with_target_domain("app.test");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/me", Some("session=alice"))])
        .unwrap();

    let (findings, _, completes) = drain(&mut rx).await;
    assert!(findings.is_empty());
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_ambiguous_unauthenticated_surfaces_as_suspicious() {
    let executor = ScriptedExecutor::new(|request| match request.header("Cookie") {
        Some(_) => json_response(200, "the authenticated dashboard with plenty of content"),
        None => json_response(200, "Please wait"),
    });

    let config = ScanConfig::default().with_target_domain("app.test");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/view", Some("session=alice"))])
        .unwrap();

    let (findings, _, _) = drain(&mut rx).await;
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, VulnerabilityKind::UnauthorizedAccess);
    assert_eq!(findings[0].risk, RiskLevel::Info);
}

#[tokio::test]
async fn test_failed_baseline_skips_all_variants() {
    let executor = ScriptedExecutor::new(|_| json_response(404, "not found"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine
        .start(vec![captured("https://app.test/api/gone", Some("session=alice"))])
        .unwrap();

    let (findings, progress, completes) = drain(&mut rx).await;
    assert!(findings.is_empty());
    // units still resolve and count toward progress
    assert_eq!(progress, Some((2, 2)));
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_transport_error_skips_unit_but_run_continues() {
    let executor = ScriptedExecutor::new(|request| match request.header("Cookie") {
        Some("session=alice") => json_response(200, "body"),
        _ => Err(ExecutorError::Transport("connection reset".into())),
    });

    let mut config = base_config();
    config.test_unauthorized_access = false;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/x", Some("session=alice"))])
        .unwrap();

    let (findings, progress, completes) = drain(&mut rx).await;
    assert!(findings.is_empty());
    assert_eq!(progress, Some((1, 1)));
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_empty_transcript_completes_immediately() {
    let executor = ScriptedExecutor::new(|_| json_response(200, ""));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine.start(Vec::new()).unwrap();

    let (findings, progress, completes) = drain(&mut rx).await;
    assert!(findings.is_empty());
    assert_eq!(progress, None);
    assert_eq!(completes, 1);
    assert_eq!(engine.state(), ScanState::Completed);
}

#[tokio::test]
async fn test_out_of_scope_requests_are_filtered_out() {
    let executor = ScriptedExecutor::new(|_| json_response(200, ""));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine
        .start(vec![captured("https://other.example/api/x", Some("session=alice"))])
        .unwrap();

    let (_, progress, completes) = drain(&mut rx).await;
    assert_eq!(progress, None);
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_duplicate_requests_probed_once() {
    let body = "{\"id\":9}";
    let executor = ScriptedExecutor::new(move |_| json_response(200, body));

    let mut config = base_config();
    config.test_unauthorized_access = false;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    let request = captured("https://app.test/api/items?id=1", Some("session=alice"));
    engine.start(vec![request.clone(), request]).unwrap();

    let (findings, progress, _) = drain(&mut rx).await;
    // one eligible request, one credential: a single unit
    assert_eq!(progress, Some((1, 1)));
    assert_eq!(findings.len(), 1);
    assert_eq!(engine.deduplicated_count(), 1);
}

#[tokio::test]
async fn test_enumeration_failure_still_completes() {
    let executor = ScriptedExecutor::new(|_| json_response(200, ""));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine.start(FailingSource).unwrap();

    let (findings, progress, completes) = drain(&mut rx).await;
    assert!(findings.is_empty());
    assert_eq!(progress, None);
    assert_eq!(completes, 1);
    assert_eq!(engine.state(), ScanState::Completed);
}

#[tokio::test]
async fn test_second_start_is_rejected_not_queued() {
    let executor = ScriptedExecutor::with_delay(
        |_| json_response(200, "body"),
        Duration::from_millis(50),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(base_config(), executor, tx);
    engine
        .start(vec![captured("https://app.test/api/slow", Some("session=alice"))])
        .unwrap();

    assert!(matches!(
        engine.start(Vec::new()),
        Err(ScanError::AlreadyRunning)
    ));

    let (_, _, completes) = drain(&mut rx).await;
    assert_eq!(completes, 1);
    // a finished engine can start again
    engine.start(Vec::new()).unwrap();
    let (_, _, completes) = drain(&mut rx).await;
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_explicit_baseline_credential_name_is_kept() {
    let body = "{\"id\":2}";
    let executor = ScriptedExecutor::new(move |_| json_response(200, body));

    let mut config = base_config();
    config.baseline_credential = Some(Credential::new("alice").with_cookie("session=alice"));
    config.test_unauthorized_access = false;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/p", Some("session=alice"))])
        .unwrap();

    let (findings, _, _) = drain(&mut rx).await;
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].baseline_credential, "alice");
}

#[tokio::test]
async fn test_mark_false_positive_and_clear() {
    let body = "{\"id\":3}";
    let executor = ScriptedExecutor::new(move |_| json_response(200, body));

    let mut config = base_config();
    config.test_unauthorized_access = false;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);
    engine
        .start(vec![captured("https://app.test/api/p", Some("session=alice"))])
        .unwrap();
    let _ = drain(&mut rx).await;

    assert!(engine.mark_false_positive(0));
    assert_eq!(engine.findings()[0].risk, RiskLevel::FalsePositive);
    assert!(!engine.mark_false_positive(5));

    engine.clear();
    assert!(engine.findings().is_empty());
    assert_eq!(engine.deduplicated_count(), 0);
}

#[tokio::test]
async fn test_pause_and_resume_gate_submissions() {
    let executor = ScriptedExecutor::with_delay(
        |_| json_response(200, "{\"id\":4}"),
        Duration::from_millis(20),
    );

    let mut config = base_config();
    config.test_unauthorized_access = false;
    config.concurrency = 1;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);

    let transcript: Vec<CapturedRequest> = (0..4)
        .map(|i| captured(&format!("https://app.test/api/item/{}", i), Some("session=alice")))
        .collect();
    engine.start(transcript).unwrap();

    engine.pause();
    assert!(engine.is_paused());
    engine.resume();
    assert!(!engine.is_paused());

    let (findings, progress, completes) = drain(&mut rx).await;
    assert_eq!(findings.len(), 4);
    assert_eq!(progress, Some((4, 4)));
    assert_eq!(completes, 1);
}

#[tokio::test]
async fn test_stop_ends_run_and_reports_complete() {
    let executor = ScriptedExecutor::with_delay(
        |_| json_response(200, "{\"id\":5}"),
        Duration::from_millis(10),
    );

    let mut config = base_config();
    config.test_unauthorized_access = false;
    config.concurrency = 1;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScanEngine::new(config, executor, tx);

    let transcript: Vec<CapturedRequest> = (0..50)
        .map(|i| captured(&format!("https://app.test/api/item/{}", i), Some("session=alice")))
        .collect();
    engine.start(transcript).unwrap();

    engine.stop();

    let (findings, _, completes) = drain(&mut rx).await;
    assert_eq!(completes, 1);
    assert_eq!(engine.state(), ScanState::Completed);
    // stop invalidates the run's generation: results that resolve afterwards
    // are discarded rather than appended
    assert_eq!(engine.findings().len(), findings.len());
    assert!(findings.len() < 50);
}
