// =====================================================================================
// File: core-threat-intel/src/retry.rs
// Description: Transport error classification and exponential-backoff retry
// =====================================================================================

use core_config::RetryConfig;
use std::future::Future;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{error, warn};

/// Closed classification of collection failures, shared by the retry policy
/// and the failure tracker.
#[derive(Error, Debug, Clone)]
pub enum CollectorError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited by server (retry-after: {retry_after:?})")]
    RateLimited { retry_after: Option<u64> },
    #[error("Transient server error: HTTP {0}")]
    TransientServer(u16),
    #[error("Authentication rejected: HTTP {0}")]
    Authentication(u16),
    #[error("Data format error: {0}")]
    DataFormat(String),
    #[error("Client error: HTTP {0}")]
    ClientError(u16),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CollectorError {
    /// Whether the retry policy may re-attempt after this failure.
    /// Unknown errors retry conservatively.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::Timeout
                | CollectorError::Network(_)
                | CollectorError::RateLimited { .. }
                | CollectorError::TransientServer(_)
                | CollectorError::Unknown(_)
        )
    }

    /// Stable kind name recorded by the failure tracker.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Timeout => "timeout",
            CollectorError::Network(_) => "network",
            CollectorError::RateLimited { .. } => "rate_limited",
            CollectorError::TransientServer(_) => "transient_server",
            CollectorError::Authentication(_) => "authentication",
            CollectorError::DataFormat(_) => "data_format",
            CollectorError::ClientError(_) => "client_error",
            CollectorError::Unknown(_) => "unknown",
        }
    }

    /// Classify a transport-level failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollectorError::Timeout
        } else if err.is_connect() || err.is_request() {
            CollectorError::Network(err.to_string())
        } else if err.is_decode() {
            CollectorError::DataFormat(err.to_string())
        } else {
            CollectorError::Unknown(err.to_string())
        }
    }

    /// Classify a non-success HTTP status. `retry_after` carries the parsed
    /// Retry-After header seconds when the server sent one.
    pub fn from_status(status: u16, retry_after: Option<u64>) -> Self {
        match status {
            429 => CollectorError::RateLimited { retry_after },
            401 | 403 => CollectorError::Authentication(status),
            500..=599 => CollectorError::TransientServer(status),
            400..=499 => CollectorError::ClientError(status),
            _ => CollectorError::Unknown(format!("HTTP {}", status)),
        }
    }

    /// Classify a non-success reqwest response, consuming it.
    pub fn from_response(response: &reqwest::Response) -> Self {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Self::from_status(response.status().as_u16(), retry_after)
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        CollectorError::from_reqwest(err)
    }
}

/// Retries an operation with exponential backoff, honouring server hints.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the next attempt. `attempt` counts from zero.
    /// For 429 responses the server's Retry-After wins, capped at the
    /// configured maximum.
    pub fn delay_for(&self, attempt: u32, error: &CollectorError) -> Duration {
        if let CollectorError::RateLimited {
            retry_after: Some(seconds),
        } = error
        {
            let capped = (*seconds as f64).min(self.config.max_delay_seconds);
            return Duration::from_secs_f64(capped);
        }

        let delay = self.config.initial_delay_seconds
            * self.config.backoff_base.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.config.max_delay_seconds))
    }

    /// Run `operation`, retrying transient failures. After the final failure
    /// the original error is re-raised.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, CollectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollectorError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        error!(error = %e, kind = e.kind(), "Non-retryable collection error");
                        return Err(e);
                    }
                    if attempt < self.config.max_retries {
                        let delay = self.delay_for(attempt, &e);
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Collection attempt failed, retrying"
                        );
                        sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CollectorError::Unknown("retry exhausted".to_string())))
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
