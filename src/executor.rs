// HTTP transport seam
// The engine only sees this trait; the real implementation rides reqwest,
// tests substitute a scripted one.

use crate::errors::ExecutorError;
use crate::models::{CapturedRequest, ResponseRecord};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Sends one probe and returns the observed response. A failure affects only
/// the unit that issued it.
pub trait HttpExecutor: Send + Sync + 'static {
    fn send(
        &self,
        request: &CapturedRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<ResponseRecord, ExecutorError>> + Send;
}

/// reqwest-backed executor. Redirects are never followed: 301/302 responses
/// are classification signals, not hops to take. Transport failures retry up
/// to the configured count; HTTP error statuses do not.
pub struct ReqwestExecutor {
    client: Client,
    retry_count: u32,
}

impl ReqwestExecutor {
    pub fn new(retry_count: u32) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .redirect(Policy::none())
            .build()
            .map_err(|e| ExecutorError::InvalidRequest(e.to_string()))?;

        Ok(Self { client, retry_count })
    }

    async fn send_once(
        &self,
        request: &CapturedRequest,
        timeout: Duration,
    ) -> Result<ResponseRecord, ExecutorError> {
        let method = reqwest::Method::from_bytes(request.method.to_string().as_bytes())
            .map_err(|e| ExecutorError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url).timeout(timeout);

        for (name, value) in &request.headers {
            // Host is derived from the URL; replaying a stale one breaks
            // virtual hosting
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecutorError::Timeout(timeout)
            } else {
                ExecutorError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.text().await.unwrap_or_default();

        Ok(ResponseRecord::new(status, headers, body))
    }
}

impl HttpExecutor for ReqwestExecutor {
    async fn send(
        &self,
        request: &CapturedRequest,
        timeout: Duration,
    ) -> Result<ResponseRecord, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request, timeout).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.retry_count => {
                    attempt += 1;
                    warn!(
                        request = %request.summary(),
                        attempt,
                        %err,
                        "probe failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
