use crate::error::ApiError;
use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::{ApiConfig, BacktestConfig};
use core_types::{StrategyId, resolve};
use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Duration;

pub mod error;
pub mod responses;
// --- Public API ---
pub use responses::{BacktestRequest, FetchOutcome};

/// The interface to the Composer symphony API.
/// Callers depend on this trait so that the HTTP implementation can be swapped
/// for an in-memory one in tests.
#[async_trait]
pub trait SymphonyApi: Send + Sync {
    /// Fetches a symphony's public details. Accepts an id or a symphony URL.
    async fn fetch_symphony(&self, reference: &str) -> Result<FetchOutcome, ApiError>;

    /// Runs a backtest of the symphony over `[start_date, end_date]`.
    async fn fetch_backtest(
        &self,
        reference: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<FetchOutcome, ApiError>;
}

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub rate_limit_delay: Duration,
    pub error_delay: Duration,
}

impl From<&ApiConfig> for RetryPolicy {
    fn from(config: &ApiConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            rate_limit_delay: Duration::from_secs(config.rate_limit_delay_secs),
            error_delay: Duration::from_secs(config.error_retry_delay_secs),
        }
    }
}

/// The reqwest-backed implementation of [`SymphonyApi`].
#[derive(Clone)]
pub struct ComposerClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    backtest: BacktestConfig,
}

impl ComposerClient {
    pub fn new(api_config: &ApiConfig, backtest: &BacktestConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: api_config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(api_config),
            backtest: backtest.clone(),
        })
    }

    /// Sends one request and decodes its body.
    ///
    /// An empty body is a failure with the server's status; a body that is not
    /// JSON is reported as a 500.
    async fn send_once(&self, request: RequestBuilder, id: &StrategyId) -> Result<FetchOutcome, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if body.is_empty() {
            return Ok(FetchOutcome::failed(status.as_u16()));
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(document) => Ok(FetchOutcome {
                success: status.is_success(),
                status: status.as_u16(),
                document,
            }),
            Err(e) => {
                tracing::error!(symphony = %id, error = %e, "Invalid JSON response");
                Ok(FetchOutcome::failed(500))
            }
        }
    }

    /// Runs `build` at most `retry.attempts` times.
    ///
    /// Rate-limited responses and transport errors are retried after their
    /// respective delays; every other response is returned as is. When the
    /// budget runs out the outcome is a failed 404.
    async fn with_retries(
        &self,
        what: &str,
        id: &StrategyId,
        build: impl Fn() -> RequestBuilder + Send + Sync,
    ) -> FetchOutcome {
        let attempts = self.retry.attempts;

        for attempt in 1..=attempts {
            let delay = match self.send_once(build(), id).await {
                Ok(outcome) if outcome.is_rate_limited() => {
                    tracing::warn!(symphony = %id, attempt, "Rate limited fetching {what}");
                    self.retry.rate_limit_delay
                }
                Ok(outcome) => {
                    if outcome.success {
                        tracing::info!(symphony = %id, "Fetched {what}");
                    } else {
                        tracing::warn!(symphony = %id, status = outcome.status, "Failed to fetch {what}");
                    }
                    return outcome;
                }
                Err(e) => {
                    tracing::warn!(symphony = %id, attempt, error = %e, "Network error fetching {what}");
                    self.retry.error_delay
                }
            };

            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(symphony = %id, attempts, "Max retries exceeded fetching {what}");
        FetchOutcome::failed(404)
    }
}

#[async_trait]
impl SymphonyApi for ComposerClient {
    async fn fetch_symphony(&self, reference: &str) -> Result<FetchOutcome, ApiError> {
        let id = resolve(reference)?;
        let url = format!("{}/v1/public/symphonies/{}", self.base_url, id);
        tracing::debug!(%url, "Fetching symphony");

        Ok(self
            .with_retries("symphony", &id, || self.client.get(&url))
            .await)
    }

    async fn fetch_backtest(
        &self,
        reference: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<FetchOutcome, ApiError> {
        if start_date > end_date {
            return Err(ApiError::InvalidDateRange { start: start_date, end: end_date });
        }
        let id = resolve(reference)?;
        let url = format!("{}/v2/public/symphonies/{}/backtest", self.base_url, id);
        let payload = BacktestRequest::new(&self.backtest, start_date, end_date);
        tracing::debug!(symphony = %id, %start_date, %end_date, "Fetching backtest");

        Ok(self
            .with_retries("backtest", &id, || self.client.post(&url).json(&payload))
            .await)
    }
}
