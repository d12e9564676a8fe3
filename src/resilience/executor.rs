//! Resilient Executor
//!
//! Wraps transport calls for one provider with circuit-breaker gating,
//! bounded retry with exponential backoff, per-attempt timeouts, and
//! single-shot 401 recovery. Failure classification is shared with the
//! circuit breaker through `BridgeError`, so retry and breaker decisions
//! never disagree about the same outcome.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::AuthenticationHandler;
use crate::error::{BridgeError, BridgeResult, HttpError, TransportError};
use crate::resilience::{CircuitBreaker, CircuitState};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{CircuitBreakerConfig, RetryConfig};

/// Absolute ceiling for a single retry backoff delay.
const BACKOFF_CEILING: Duration = Duration::from_secs(10);

/// Resilient request executor for one provider connection.
pub struct ResilientExecutor<T: HttpTransport> {
    provider: String,
    retry: RetryConfig,
    timeout: Duration,
    breaker: CircuitBreaker,
    transport: Arc<T>,
    auth: Arc<AuthenticationHandler<T>>,
}

impl<T: HttpTransport> ResilientExecutor<T> {
    pub fn new(
        provider: impl Into<String>,
        retry: RetryConfig,
        circuit: CircuitBreakerConfig,
        timeout: Duration,
        transport: Arc<T>,
        auth: Arc<AuthenticationHandler<T>>,
    ) -> Self {
        let provider = provider.into();
        Self {
            breaker: CircuitBreaker::new(provider.clone(), circuit),
            provider,
            retry,
            timeout,
            transport,
            auth,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    /// Execute a request with the full resilience pipeline.
    ///
    /// Each attempt is gated by the circuit breaker and bounded by the
    /// per-attempt timeout. Retryable failures back off exponentially up
    /// to `max_attempts` total attempts. A 401 triggers exactly one
    /// logout/re-authenticate/replay outside the retry budget.
    pub async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> BridgeResult<HttpResponse> {
        let mut attempt: u32 = 0;
        let mut delay = self.retry.initial_delay;
        let mut reauth_done = false;

        loop {
            attempt += 1;
            self.breaker.preflight()?;

            match self.attempt_once(&request, cancel).await {
                Ok(response) => {
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(error) if error.is_cancelled() => {
                    self.breaker.record_trial_abort();
                    return Err(error);
                }
                Err(error) => {
                    if error.counts_toward_circuit() {
                        self.breaker.record_failure();
                    } else {
                        // The provider answered; it is not failing, the
                        // request is.
                        self.breaker.record_success();
                    }

                    let stale_session = matches!(error, BridgeError::Http(_))
                        && error.status() == Some(401)
                        && self.auth.has_credentials(&self.provider);
                    if stale_session && !reauth_done {
                        reauth_done = true;
                        attempt -= 1; // the replay sits outside the retry budget
                        warn!(provider = %self.provider, "401 received, re-authenticating once");
                        self.auth.logout(&self.provider).await;
                        self.auth.authenticate(&self.provider, None, cancel).await?;
                        continue;
                    }

                    if !error.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(error);
                    }

                    debug!(
                        provider = %self.provider,
                        attempt,
                        backoff = ?delay,
                        "retrying after failure"
                    );
                    self.backoff(delay, cancel).await?;
                    delay = delay
                        .mul_f64(self.retry.backoff_factor)
                        .min(BACKOFF_CEILING);
                }
            }
        }
    }

    /// One attempt: inject (possibly refreshed) auth headers, bound the
    /// transport call by the per-attempt timeout, and turn HTTP error
    /// statuses into classified errors.
    async fn attempt_once(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> BridgeResult<HttpResponse> {
        let mut attempt_request = request.clone();
        attempt_request.timeout = Some(self.timeout);

        if self.auth.has_credentials(&self.provider) {
            let auth = self.auth.authenticate(&self.provider, None, cancel).await?;
            for (name, value) in auth.headers {
                attempt_request.headers.entry(name).or_insert(value);
            }
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.transport.send(attempt_request, cancel),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(BridgeError::Transport(TransportError::Timeout {
                    timeout: self.timeout,
                }))
            }
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(BridgeError::Http(HttpError {
                status: response.status,
                headers: response.headers,
                body: response.body,
            }))
        }
    }

    /// Cancel-aware retry backoff.
    async fn backoff(&self, delay: Duration, cancel: &CancellationToken) -> BridgeResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BridgeError::Transport(TransportError::Cancelled)),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
