//! Provider Bridge
//!
//! Facade composing the rate limiter, authentication handler, and
//! resilient executor behind one request surface per HTTP verb. Each
//! call throttles first, then runs through the executor; errors carrying
//! a configured rate-limit status are reported to the limiter before
//! they propagate.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::AuthenticationHandler;
use crate::error::{BridgeError, BridgeResult, ConfigurationError};
use crate::resilience::{AdaptiveRateLimiter, CircuitState, RateLimiterMetrics, ResilientExecutor};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::types::BridgeConfig;

/// Coarse provider health derived from circuit and rate-limit state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Point-in-time snapshot of one bridge's resilience state.
#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub provider: String,
    pub circuit_state: CircuitState,
    pub circuit_failure_count: u32,
    pub rate_limiter: RateLimiterMetrics,
}

/// One provider connection with authentication, rate limiting, and
/// fault tolerance applied to every call.
pub struct ProviderBridge<T: HttpTransport> {
    provider: String,
    base_url: Option<String>,
    health_check_endpoint: Option<String>,
    rate_limit_status_codes: Vec<u16>,
    auth: Arc<AuthenticationHandler<T>>,
    limiter: AdaptiveRateLimiter,
    executor: ResilientExecutor<T>,
}

impl<T: HttpTransport> ProviderBridge<T> {
    pub fn new(config: BridgeConfig, transport: Arc<T>) -> Self {
        let auth = Arc::new(AuthenticationHandler::new(transport.clone()));
        auth.register_provider_config(&config.provider, config.auth.clone());

        let limiter = AdaptiveRateLimiter::new();
        limiter.register(&config.provider, config.resilience.rate_limit.clone());

        let executor = ResilientExecutor::new(
            config.provider.clone(),
            config.resilience.retry.clone(),
            config.resilience.circuit.clone(),
            config.resilience.timeout,
            transport,
            auth.clone(),
        );

        Self {
            provider: config.provider,
            base_url: config.auth.base_url,
            health_check_endpoint: config.health_check_endpoint,
            rate_limit_status_codes: config.resilience.rate_limit.rate_limit_status_codes,
            auth,
            limiter,
            executor,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub async fn get(&self, path: &str) -> BridgeResult<HttpResponse> {
        self.request(HttpMethod::Get, path, None, &CancellationToken::new())
            .await
    }

    pub async fn post(&self, path: &str, body: Option<String>) -> BridgeResult<HttpResponse> {
        self.request(HttpMethod::Post, path, body, &CancellationToken::new())
            .await
    }

    pub async fn put(&self, path: &str, body: Option<String>) -> BridgeResult<HttpResponse> {
        self.request(HttpMethod::Put, path, body, &CancellationToken::new())
            .await
    }

    pub async fn patch(&self, path: &str, body: Option<String>) -> BridgeResult<HttpResponse> {
        self.request(HttpMethod::Patch, path, body, &CancellationToken::new())
            .await
    }

    pub async fn delete(&self, path: &str) -> BridgeResult<HttpResponse> {
        self.request(HttpMethod::Delete, path, None, &CancellationToken::new())
            .await
    }

    /// Issue a request through the full pipeline: throttle, authenticate,
    /// execute with retry and circuit gating. Cancelling the token aborts
    /// the in-flight attempt and any pending backoff.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        cancel: &CancellationToken,
    ) -> BridgeResult<HttpResponse> {
        let url = self.resolve_url(path)?;

        self.limiter.throttle(&self.provider).await;

        let mut request = HttpRequest::new(method, url);
        if body.is_some() {
            request
                .headers
                .insert("Content-Type".to_string(), "application/json".to_string());
        }
        request.body = body;

        match self.executor.execute(request, cancel).await {
            Ok(response) => Ok(response),
            Err(error) => {
                if let BridgeError::Http(http) = &error {
                    if self.rate_limit_status_codes.contains(&http.status) {
                        self.limiter.handle_rate_limit_response(&self.provider, http);
                        return Err(BridgeError::RateLimited {
                            provider: self.provider.clone(),
                            retry_after: self.limiter.retry_after(&self.provider),
                        });
                    }
                }
                Err(error)
            }
        }
    }

    /// Worst of circuit state and rate-limit state.
    pub fn health_status(&self) -> HealthState {
        match self.executor.circuit_state() {
            CircuitState::Open => HealthState::Unhealthy,
            CircuitState::HalfOpen => HealthState::Degraded,
            CircuitState::Closed if self.limiter.is_rate_limited(&self.provider) => {
                HealthState::Degraded
            }
            CircuitState::Closed => HealthState::Healthy,
        }
    }

    /// Probe the configured health endpoint through the full pipeline.
    pub async fn check_health(&self) -> BridgeResult<HealthState> {
        let endpoint = self.health_check_endpoint.clone().ok_or_else(|| {
            ConfigurationError::MissingRequired {
                field: "health_check_endpoint".to_string(),
            }
        })?;

        match self.get(&endpoint).await {
            Ok(_) => Ok(self.health_status()),
            Err(_) => Ok(HealthState::Unhealthy),
        }
    }

    /// Operational recovery action: close the circuit, drop adaptive
    /// rate-limiter state, and clear the session cache.
    pub async fn reset(&self) {
        self.executor.reset_circuit();
        self.limiter.reset(&self.provider);
        self.auth.logout(&self.provider).await;
        debug!(provider = %self.provider, "bridge state reset");
    }

    pub fn metrics(&self) -> BridgeMetrics {
        BridgeMetrics {
            provider: self.provider.clone(),
            circuit_state: self.executor.circuit_state(),
            circuit_failure_count: self.executor.circuit_failure_count(),
            rate_limiter: self.limiter.metrics(&self.provider),
        }
    }

    /// Access to the authentication handler, e.g. for explicit
    /// `authenticate`/`logout` calls outside the request path.
    pub fn auth(&self) -> &AuthenticationHandler<T> {
        &self.auth
    }

    fn resolve_url(&self, path: &str) -> BridgeResult<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(path.to_string());
        }

        let base = self.base_url.as_deref().ok_or_else(|| {
            ConfigurationError::MissingRequired {
                field: "base_url".to_string(),
            }
        })?;

        // A trailing slash keeps the last base path segment when joining.
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let joined = Url::parse(&base)
            .and_then(|b| b.join(path.trim_start_matches('/')))
            .map_err(|_| ConfigurationError::InvalidUrl {
                url: format!("{}{}", base, path),
            })?;
        Ok(joined.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;
    use crate::types::{
        Credential, ProviderAuthConfig, RateLimitConfig, ResilienceConfig, RetryConfig,
    };
    use std::time::Duration;

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::new("qtest");
        config.auth = ProviderAuthConfig {
            credentials: vec![Credential::token("tok-1")],
            base_url: Some("https://qtest.example/api/v3".to_string()),
            ..Default::default()
        };
        config.resilience = ResilienceConfig {
            retry: RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
            rate_limit: RateLimitConfig {
                initial_delay: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        config
    }

    fn bridge() -> (Arc<MockHttpTransport>, ProviderBridge<MockHttpTransport>) {
        let transport = Arc::new(MockHttpTransport::new());
        let bridge = ProviderBridge::new(config(), transport.clone());
        (transport, bridge)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_joins_base_url_and_injects_auth() {
        let (transport, bridge) = bridge();
        transport.queue_status(200);

        bridge.get("/projects/1/test-runs").await.unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.url, "https://qtest.example/api/v3/projects/1/test-runs");
        assert_eq!(sent.headers.get("Authorization").unwrap(), "Bearer tok-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_sets_json_content_type() {
        let (transport, bridge) = bridge();
        transport.queue_status(201);

        bridge
            .post("/test-runs", Some(r#"{"name":"smoke"}"#.to_string()))
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(sent.body.as_deref(), Some(r#"{"name":"smoke"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_url_bypasses_base() {
        let (transport, bridge) = bridge();
        transport.queue_status(200);

        bridge.get("https://other.example/ping").await.unwrap();
        assert_eq!(transport.last_request().unwrap().url, "https://other.example/ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_relative_path_without_base_url_is_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        let mut cfg = config();
        cfg.auth.base_url = None;
        let bridge = ProviderBridge::new(cfg, transport.clone());

        let result = bridge.get("/ping").await;
        assert!(matches!(result, Err(BridgeError::Configuration(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_error_updates_limiter() {
        let (transport, bridge) = bridge();
        transport.queue_status_with_headers(
            429,
            &[("Retry-After", "60")],
        );

        let result = bridge.get("/test-runs").await;
        match result {
            Err(BridgeError::RateLimited { provider, retry_after }) => {
                assert_eq!(provider, "qtest");
                let retry_after = retry_after.unwrap();
                assert!(retry_after >= Duration::from_millis(59_900));
                assert!(retry_after <= Duration::from_millis(60_100));
            }
            other => panic!("expected rate-limited error, got {:?}", other.map(|_| ())),
        }
        assert!(bridge.limiter.is_rate_limited("qtest"));
        assert_eq!(bridge.health_status(), HealthState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_status_reflects_circuit() {
        let (transport, bridge) = bridge();
        assert_eq!(bridge.health_status(), HealthState::Healthy);

        for _ in 0..5 {
            transport.queue_status(500);
        }
        for _ in 0..5 {
            let _ = bridge.get("/test-runs").await;
        }
        assert_eq!(bridge.health_status(), HealthState::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_circuit_and_limiter() {
        let (transport, bridge) = bridge();
        for _ in 0..5 {
            transport.queue_status(500);
        }
        for _ in 0..5 {
            let _ = bridge.get("/test-runs").await;
        }

        bridge.reset().await;
        assert_eq!(bridge.health_status(), HealthState::Healthy);

        let metrics = bridge.metrics();
        assert_eq!(metrics.circuit_state, CircuitState::Closed);
        assert_eq!(metrics.circuit_failure_count, 0);
        assert_eq!(metrics.rate_limiter.requests_last_minute, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_health_probes_endpoint() {
        let transport = Arc::new(MockHttpTransport::new());
        let mut cfg = config();
        cfg.health_check_endpoint = Some("/system/health".to_string());
        let bridge = ProviderBridge::new(cfg, transport.clone());
        transport.queue_status(200);

        let health = bridge.check_health().await.unwrap();
        assert_eq!(health, HealthState::Healthy);
        assert_eq!(
            transport.last_request().unwrap().url,
            "https://qtest.example/api/v3/system/health"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_health_without_endpoint_is_config_error() {
        let (_, bridge) = bridge();
        let result = bridge.check_health().await;
        assert!(matches!(result, Err(BridgeError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_sequential_calls() {
        let transport = Arc::new(MockHttpTransport::new());
        let mut cfg = config();
        cfg.resilience.rate_limit.initial_delay = Duration::from_millis(200);
        let bridge = ProviderBridge::new(cfg, transport.clone());
        transport.queue_status(200);
        transport.queue_status(200);

        let start = tokio::time::Instant::now();
        bridge.get("/a").await.unwrap();
        bridge.get("/b").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
