// Scan orchestration for authprobe
// One run at a time: enumerate the transcript, filter it, fan probe units
// out over a bounded pool, classify each response pair, and stream findings
// to the injected event channel.

use crate::auth::{strip_auth_headers, Credential};
use crate::config::{matches_target_domain, ScanConfig};
use crate::errors::ScanError;
use crate::executor::HttpExecutor;
use crate::filter::RequestFilter;
use crate::models::{CapturedRequest, Finding, ResponseRecord, RiskLevel, VulnerabilityKind};
use crate::verdict::{self, Verdict};
use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, OnceCell, Semaphore};
use tracing::{debug, error, info, warn};

/// Name used for the baseline identity when none is configured by hand
pub const BASELINE_CREDENTIAL_NAME: &str = "baseline";
/// Credential label on unauthenticated-access findings
pub const UNAUTHENTICATED_NAME: &str = "unauthenticated";

const SNIPPET_LEN: usize = 500;

/// Events emitted over the channel injected at engine construction
#[derive(Debug)]
pub enum ScanEvent {
    /// A unit of work resolved; counts are monotonically increasing
    Progress { completed: usize, total: usize },
    Finding(Box<Finding>),
    /// Sent exactly once per run, even when enumeration fails
    Complete,
}

/// Lifecycle of the engine. Only one run is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
}

/// A finite, ordered transcript of previously captured transactions. The
/// engine only reads it.
pub trait RequestSource: Send + 'static {
    fn transactions(&self) -> Result<Vec<CapturedRequest>, ScanError>;
}

impl RequestSource for Vec<CapturedRequest> {
    fn transactions(&self) -> Result<Vec<CapturedRequest>, ScanError> {
        Ok(self.clone())
    }
}

/// One variant transformation of an originating request
#[derive(Clone)]
enum Variant {
    Credential(Credential),
    Unauthenticated,
}

pub struct ScanEngine<E: HttpExecutor> {
    shared: Arc<Shared<E>>,
}

struct Shared<E> {
    config: ScanConfig,
    executor: E,
    filter: RequestFilter,
    events: mpsc::UnboundedSender<ScanEvent>,
    state: Mutex<ScanState>,
    /// Signalled on resume and stop so a paused driver wakes up
    resume: Notify,
    /// Bumped on every start and stop; a unit whose generation is stale
    /// discards its result instead of appending after the run ended
    generation: AtomicU64,
    findings: Mutex<Vec<Finding>>,
    /// Units resolved so far; incremented and reported under one lock so
    /// progress events arrive in increasing order
    completed: Mutex<usize>,
}

impl<E: HttpExecutor> ScanEngine<E> {
    /// Build an engine around a sanitized copy of the configuration. Events
    /// flow to the provided channel; the engine holds no other callbacks.
    pub fn new(
        config: ScanConfig,
        executor: E,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        let config = config.sanitized();
        let filter = RequestFilter::new(config.clone());

        Self {
            shared: Arc::new(Shared {
                config,
                executor,
                filter,
                events,
                state: Mutex::new(ScanState::Idle),
                resume: Notify::new(),
                generation: AtomicU64::new(0),
                findings: Mutex::new(Vec::new()),
                completed: Mutex::new(0),
            }),
        }
    }

    /// Start a run on a driver task. Errors if a run is already active;
    /// a second run is never queued. Must be called within a Tokio runtime.
    pub fn start<S: RequestSource>(&self, source: S) -> Result<(), ScanError> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                ScanState::Running | ScanState::Paused | ScanState::Stopping => {
                    return Err(ScanError::AlreadyRunning);
                }
                ScanState::Idle | ScanState::Completed => *state = ScanState::Running,
            }
        }

        *self.shared.completed.lock().unwrap_or_else(|e| e.into_inner()) = 0;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();

        tokio::spawn(async move {
            Shared::drive(shared, source, generation).await;
        });

        info!("scan started");
        Ok(())
    }

    /// Block further submissions; in-flight units run to completion.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == ScanState::Running {
            *state = ScanState::Paused;
            info!("scan paused");
        }
    }

    pub fn resume(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ScanState::Paused {
                *state = ScanState::Running;
                info!("scan resumed");
            }
        }
        self.shared.resume.notify_one();
    }

    /// Cancel not-yet-started units and invalidate the run's generation so
    /// late results are discarded. In-flight sends finish on their own.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                ScanState::Running | ScanState::Paused => *state = ScanState::Stopping,
                _ => return,
            }
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.resume.notify_one();
        info!("scan stopping");
    }

    pub fn state(&self) -> ScanState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ScanState::Running | ScanState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ScanState::Paused
    }

    /// Snapshot copy of the findings so far; the lock is never held during
    /// iteration by callers.
    pub fn findings(&self) -> Vec<Finding> {
        self.shared
            .findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reviewer action: demote a finding to FALSE_POSITIVE. The engine
    /// itself never assigns that tier.
    pub fn mark_false_positive(&self, index: usize) -> bool {
        let mut findings = self.shared.findings.lock().unwrap_or_else(|e| e.into_inner());
        match findings.get_mut(index) {
            Some(finding) => {
                finding.mark_false_positive();
                true
            }
            None => false,
        }
    }

    /// Drop all findings and forget every deduplicated (method, url) key,
    /// ready for the next run.
    pub fn clear(&self) {
        self.shared
            .findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.shared.filter.reset();
    }

    pub fn deduplicated_count(&self) -> usize {
        self.shared.filter.deduplicated_count()
    }
}

impl<E: HttpExecutor> Shared<E> {
    async fn drive(shared: Arc<Self>, source: impl RequestSource, generation: u64) {
        let transcript = match source.transactions() {
            Ok(transcript) => transcript,
            Err(err) => {
                // enumeration failure aborts submissions but still completes
                error!(%err, "transcript enumeration failed");
                shared.finish();
                return;
            }
        };
        info!(total = transcript.len(), "transcript enumerated");

        let baseline_credential = shared.resolve_baseline_credential(&transcript);
        let baseline_name = baseline_credential
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| BASELINE_CREDENTIAL_NAME.to_string());

        let eligible: Vec<CapturedRequest> = transcript
            .iter()
            .filter(|request| shared.filter.should_scan(request))
            .cloned()
            .collect();
        info!(eligible = eligible.len(), "transcript filtered");

        if eligible.is_empty() {
            shared.finish();
            return;
        }

        let variants = shared.variant_plan();
        if variants.is_empty() {
            warn!("no test credentials configured and unauthenticated test disabled");
            shared.finish();
            return;
        }

        let total = eligible.len() * variants.len();
        let semaphore = Arc::new(Semaphore::new(shared.config.concurrency));
        let timeout = Duration::from_secs(shared.config.timeout_secs);
        let mut handles = Vec::with_capacity(total);

        'submit: for request in eligible {
            // one baseline send per originating request, shared by all of
            // its variants
            let baseline_cell: Arc<OnceCell<Option<ResponseRecord>>> = Arc::new(OnceCell::new());

            for variant in &variants {
                if !shared.wait_if_paused().await {
                    break 'submit;
                }

                let unit = Unit {
                    shared: shared.clone(),
                    semaphore: semaphore.clone(),
                    request: request.clone(),
                    baseline_cell: baseline_cell.clone(),
                    variant: variant.clone(),
                    baseline_name: baseline_name.clone(),
                    generation,
                    total,
                    timeout,
                };
                handles.push(tokio::spawn(unit.run()));
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        shared.finish();
    }

    /// Explicit baseline credential wins when it has a cookie; otherwise the
    /// first in-scope transcript request carrying one is adopted.
    fn resolve_baseline_credential(&self, transcript: &[CapturedRequest]) -> Option<Credential> {
        if let Some(explicit) = &self.config.baseline_credential {
            if explicit.has_cookie() {
                return Some(explicit.clone());
            }
        }

        for request in transcript {
            if !matches_target_domain(&request.host, &self.config.target_domains) {
                continue;
            }
            if request.header("Cookie").is_some_and(|c| !c.is_empty()) {
                let credential = Credential::extract_from(request, BASELINE_CREDENTIAL_NAME);
                info!(credential = %credential.summary(), "derived baseline credential from transcript");
                return Some(credential);
            }
        }

        if let Some(explicit) = &self.config.baseline_credential {
            return Some(explicit.clone());
        }

        warn!("no baseline credential configured or derivable; probes run without one");
        None
    }

    fn variant_plan(&self) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self
            .config
            .test_credentials
            .iter()
            .cloned()
            .map(Variant::Credential)
            .collect();

        if self.config.test_unauthorized_access {
            variants.push(Variant::Unauthenticated);
        }

        variants
    }

    /// Gate before each submission: true to proceed, false when the run was
    /// stopped. A paused driver parks on the notify instead of polling.
    async fn wait_if_paused(&self) -> bool {
        loop {
            let state = *self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state {
                ScanState::Running => return true,
                ScanState::Paused => self.resume.notified().await,
                _ => return false,
            }
        }
    }

    fn record_completed(&self, total: usize) {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        *completed += 1;
        let _ = self.events.send(ScanEvent::Progress {
            completed: *completed,
            total,
        });
    }

    fn record_finding(&self, finding: Finding, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(url = %finding.url, "discarding finding from superseded run");
            return;
        }

        {
            let mut findings = self.findings.lock().unwrap_or_else(|e| e.into_inner());
            findings.push(finding.clone());
        }

        info!(
            kind = %finding.kind,
            risk = %finding.risk,
            url = %finding.url,
            similarity = finding.similarity,
            "finding recorded"
        );
        let _ = self.events.send(ScanEvent::Finding(Box::new(finding)));
    }

    fn finish(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = ScanState::Completed;
        }
        let findings = self.findings.lock().unwrap_or_else(|e| e.into_inner()).len();
        info!(findings, "scan complete");
        let _ = self.events.send(ScanEvent::Complete);
    }
}

/// One probe: a single (originating request, variant) pair
struct Unit<E: HttpExecutor> {
    shared: Arc<Shared<E>>,
    semaphore: Arc<Semaphore>,
    request: CapturedRequest,
    baseline_cell: Arc<OnceCell<Option<ResponseRecord>>>,
    variant: Variant,
    baseline_name: String,
    generation: u64,
    total: usize,
    timeout: Duration,
}

impl<E: HttpExecutor> Unit<E> {
    async fn run(self) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return;
        };

        // stopped while queued: cancelled before doing any work
        if self.shared.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }

        let baseline = self
            .baseline_cell
            .get_or_init(|| async {
                match self.shared.executor.send(&self.request, self.timeout).await {
                    Ok(response) => Some(response),
                    Err(err) => {
                        warn!(request = %self.request.summary(), %err, "baseline send failed");
                        None
                    }
                }
            })
            .await;

        if let Some(baseline) = baseline {
            if baseline.status < 400 {
                self.probe(baseline).await;
            }
            // baseline error status: all variants for this request skip
        }

        self.shared.record_completed(self.total);
    }

    async fn probe(&self, baseline: &ResponseRecord) {
        let (variant_request, variant_name, kind) = match &self.variant {
            Variant::Credential(credential) => (
                credential.apply_to(&self.request),
                credential.name.clone(),
                VulnerabilityKind::PrivilegeEscalation,
            ),
            Variant::Unauthenticated => (
                strip_auth_headers(&self.request),
                UNAUTHENTICATED_NAME.to_string(),
                VulnerabilityKind::UnauthorizedAccess,
            ),
        };

        let variant_response = match self
            .shared
            .executor
            .send(&variant_request, self.timeout)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    request = %variant_request.summary(),
                    credential = %variant_name,
                    %err,
                    "variant send failed, unit skipped"
                );
                return;
            }
        };

        let classification = match kind {
            VulnerabilityKind::PrivilegeEscalation => verdict::classify_privilege_escalation(
                baseline,
                &variant_response,
                &self.shared.config,
            ),
            VulnerabilityKind::UnauthorizedAccess => verdict::classify_unauthorized_access(
                baseline,
                &variant_response,
                &self.shared.config,
            ),
        };

        let risk = match (kind, classification.verdict) {
            (VulnerabilityKind::PrivilegeEscalation, Verdict::Vulnerable) => {
                verdict::privilege_escalation_risk(classification.similarity)
            }
            (VulnerabilityKind::UnauthorizedAccess, Verdict::Vulnerable) => RiskLevel::High,
            (VulnerabilityKind::UnauthorizedAccess, Verdict::Suspicious) => RiskLevel::Info,
            _ => return,
        };

        let finding = Finding {
            kind,
            risk,
            method: self.request.method,
            url: self.request.url.clone(),
            baseline_status: baseline.status,
            variant_status: variant_response.status,
            similarity: classification.similarity,
            baseline_snippet: verdict::response_snippet(&baseline.body, SNIPPET_LEN),
            variant_snippet: verdict::response_snippet(&variant_response.body, SNIPPET_LEN),
            baseline_credential: self.baseline_name.clone(),
            variant_credential: variant_name,
            baseline_request: self.request.clone(),
            variant_request,
            detected_at: Local::now(),
        };

        self.shared.record_finding(finding, self.generation);
    }
}
