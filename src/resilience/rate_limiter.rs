//! Adaptive Rate Limiter
//!
//! Per-provider request pacing that reacts to provider-signaled quota
//! pressure. `throttle` reserves a permit slot under the lock and sleeps
//! outside it, so spacing holds for any number of concurrent callers
//! without blocking a worker thread, and providers never serialize
//! against each other.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::types::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time rate limiter readings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterMetrics {
    pub requests_last_minute: usize,
    pub current_delay: Duration,
    pub is_rate_limited: bool,
}

struct ProviderLimiterState {
    config: RateLimitConfig,
    request_timestamps: VecDeque<Instant>,
    current_delay: Duration,
    rate_limited_until: Option<Instant>,
    /// Earliest instant the next permit may be granted. Reserved under
    /// the lock so concurrent callers are spaced correctly.
    next_permit: Instant,
}

impl ProviderLimiterState {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            request_timestamps: VecDeque::new(),
            rate_limited_until: None,
            next_permit: Instant::now(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.request_timestamps.front() {
            if now.duration_since(*front) > WINDOW {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Reserve the next permit slot at or after `not_before`, honoring
    /// the spacing delay and any active rate-limit deadline.
    fn reserve(&mut self, not_before: Instant) -> Instant {
        let mut at = not_before.max(self.next_permit);
        if let Some(until) = self.rate_limited_until {
            at = at.max(until);
        }
        self.next_permit = at + self.current_delay;
        at
    }

    /// Grow the spacing once the trailing window exceeds the configured
    /// share of the per-minute quota. Decay happens only via `reset`.
    fn apply_adaptive_backoff(&mut self) {
        let threshold =
            self.config.max_requests_per_minute as f64 * self.config.backoff_threshold;
        if self.request_timestamps.len() as f64 > threshold {
            let grown = self.current_delay.mul_f64(self.config.backoff_factor);
            self.current_delay = grown.min(self.config.max_delay).max(self.current_delay);
        }
    }
}

type LimiterSlot = Arc<Mutex<ProviderLimiterState>>;

/// Adaptive per-provider rate limiter.
pub struct AdaptiveRateLimiter {
    providers: Mutex<HashMap<String, LimiterSlot>>,
}

impl AdaptiveRateLimiter {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Install (or replace) the configuration for a provider. Providers
    /// touched without registration get `RateLimitConfig::default()`.
    pub fn register(&self, provider: impl Into<String>, config: RateLimitConfig) {
        self.providers
            .lock()
            .unwrap()
            .insert(provider.into(), Arc::new(Mutex::new(ProviderLimiterState::new(config))));
    }

    fn slot(&self, provider: &str) -> LimiterSlot {
        self.providers
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ProviderLimiterState::new(RateLimitConfig::default())))
            })
            .clone()
    }

    /// Suspend until it is safe to issue a request against the provider,
    /// then record the permitted call. Two calls for the same provider
    /// are never permitted closer together than the current delay, and
    /// no call is permitted while a rate-limit deadline is active.
    pub async fn throttle(&self, provider: &str) {
        let slot = self.slot(provider);
        let mut permit_at = {
            let mut state = slot.lock().unwrap();
            let now = Instant::now();
            state.prune(now);
            state.apply_adaptive_backoff();

            let at = state.reserve(now);
            state.request_timestamps.push_back(at);
            at
        };

        // A rate-limit deadline may land while this caller sleeps on
        // its reserved slot; re-check after waking and push the permit
        // past the deadline if so.
        loop {
            if permit_at > Instant::now() {
                debug!(provider, wait = ?(permit_at - Instant::now()), "throttling request");
            }
            tokio::time::sleep_until(permit_at).await;

            let mut state = slot.lock().unwrap();
            let deadline_moved = state
                .rate_limited_until
                .map(|until| until > permit_at)
                .unwrap_or(false);
            if !deadline_moved {
                return;
            }
            permit_at = state.reserve(Instant::now());
        }
    }

    /// React to a provider-signaled rate limit. The reset time is taken,
    /// in priority order, from the provider-specific extractor, the
    /// configured custom header, then the standard `Retry-After` header
    /// (seconds or HTTP-date). The deadline blocks `throttle` and the
    /// current delay is forced to at least the remaining duration.
    pub fn handle_rate_limit_response(&self, provider: &str, error: &HttpError) {
        let slot = self.slot(provider);
        let mut state = slot.lock().unwrap();

        if !state.config.rate_limit_status_codes.contains(&error.status) {
            return;
        }

        let delay = extract_reset_delay(&state.config, error).unwrap_or_else(|| {
            // No reset signal from the provider: grow our own spacing.
            state
                .current_delay
                .mul_f64(state.config.backoff_factor)
                .min(state.config.max_delay)
        });

        let until = Instant::now() + delay;
        state.rate_limited_until = Some(until);
        state.current_delay = state.current_delay.max(delay);
        warn!(provider, status = error.status, backoff = ?delay, "provider signaled rate limit");
    }

    /// Time remaining until the active rate-limit deadline, if any.
    pub fn retry_after(&self, provider: &str) -> Option<Duration> {
        let slot = self.slot(provider);
        let state = slot.lock().unwrap();
        let now = Instant::now();
        state
            .rate_limited_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Whether the provider currently has an active rate-limit deadline.
    pub fn is_rate_limited(&self, provider: &str) -> bool {
        let slot = self.slot(provider);
        let state = slot.lock().unwrap();
        state
            .rate_limited_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Clear timestamps, delay, and deadline back to the provider's
    /// initial configuration.
    pub fn reset(&self, provider: &str) {
        let slot = self.slot(provider);
        let mut state = slot.lock().unwrap();
        state.request_timestamps.clear();
        state.current_delay = state.config.initial_delay;
        state.rate_limited_until = None;
        state.next_permit = Instant::now();
    }

    pub fn metrics(&self, provider: &str) -> RateLimiterMetrics {
        let slot = self.slot(provider);
        let mut state = slot.lock().unwrap();
        let now = Instant::now();
        state.prune(now);
        RateLimiterMetrics {
            requests_last_minute: state.request_timestamps.len(),
            current_delay: state.current_delay,
            is_rate_limited: state
                .rate_limited_until
                .map(|until| now < until)
                .unwrap_or(false),
        }
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset-time extraction with custom-extractor-first, custom-header-next,
/// standard-header-last precedence.
fn extract_reset_delay(config: &RateLimitConfig, error: &HttpError) -> Option<Duration> {
    if let Some(extract) = &config.extract_reset_time {
        if let Some(reset_at) = extract(error) {
            return Some(
                (reset_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO),
            );
        }
    }

    if let Some(name) = &config.retry_after_header {
        if let Some(value) = error.header(name) {
            if let Some(delay) = parse_retry_after(value) {
                return Some(delay);
            }
        }
    }

    error.header("retry-after").and_then(parse_retry_after)
}

/// `Retry-After` value: either a delay in seconds or an HTTP date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|at| (at.with_timezone(&Utc) - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_429(headers: &[(&str, &str)]) -> HttpError {
        HttpError {
            status: 429,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    fn config(initial_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            initial_delay: Duration::from_millis(initial_ms),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_calls_by_current_delay() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(100));

        let start = Instant::now();
        limiter.throttle("zephyr").await;
        limiter.throttle("zephyr").await;
        limiter.throttle("zephyr").await;

        // First call is immediate, the next two wait 100ms each.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_do_not_serialize_against_each_other() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(10_000));
        limiter.register("qtest", config(10_000));

        let start = Instant::now();
        limiter.throttle("zephyr").await;
        limiter.throttle("qtest").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_seconds_sets_deadline() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(0));

        limiter.handle_rate_limit_response("zephyr", &http_429(&[("Retry-After", "60")]));
        assert!(limiter.is_rate_limited("zephyr"));

        let metrics = limiter.metrics("zephyr");
        assert!(metrics.current_delay >= Duration::from_millis(59_900));
        assert!(metrics.current_delay <= Duration::from_millis(60_100));

        let start = Instant::now();
        limiter.throttle("zephyr").await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(!limiter.is_rate_limited("zephyr"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_arriving_mid_wait_blocks_pending_caller() {
        let limiter = Arc::new(AdaptiveRateLimiter::new());
        limiter.register("zephyr", config(10_000));

        limiter.throttle("zephyr").await;

        // Second caller reserves its slot 10s out, then sleeps on it.
        let start = Instant::now();
        let waiter = tokio::spawn({
            let limiter = limiter.clone();
            async move {
                limiter.throttle("zephyr").await;
                Instant::now()
            }
        });

        // Provider signals a 60s deadline while the caller is waiting.
        tokio::time::advance(Duration::from_secs(1)).await;
        limiter.handle_rate_limit_response("zephyr", &http_429(&[("Retry-After", "60")]));

        let granted_at = waiter.await.unwrap();
        assert!(granted_at - start >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_header_takes_precedence_over_standard() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(
            "zephyr",
            RateLimitConfig {
                retry_after_header: Some("X-RateLimit-Reset-After".to_string()),
                ..config(0)
            },
        );

        limiter.handle_rate_limit_response(
            "zephyr",
            &http_429(&[("X-RateLimit-Reset-After", "10"), ("Retry-After", "60")]),
        );
        let metrics = limiter.metrics("zephyr");
        assert!(metrics.current_delay >= Duration::from_secs(10));
        assert!(metrics.current_delay < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_extractor_takes_precedence_over_headers() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(
            "zephyr",
            RateLimitConfig {
                extract_reset_time: Some(Arc::new(|_| {
                    Some(Utc::now() + chrono::Duration::seconds(5))
                })),
                ..config(0)
            },
        );

        limiter.handle_rate_limit_response("zephyr", &http_429(&[("Retry-After", "60")]));
        let metrics = limiter.metrics("zephyr");
        assert!(metrics.current_delay <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_date_retry_after() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(0));

        let at = (Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        limiter.handle_rate_limit_response("zephyr", &http_429(&[("Retry-After", &at)]));

        let metrics = limiter.metrics("zephyr");
        assert!(metrics.is_rate_limited);
        assert!(metrics.current_delay >= Duration::from_secs(28));
        assert!(metrics.current_delay <= Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_configured_status_is_ignored() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(0));

        let error = HttpError {
            status: 503,
            headers: [("retry-after".to_string(), "60".to_string())].into_iter().collect(),
            body: String::new(),
        };
        limiter.handle_rate_limit_response("zephyr", &error);
        assert!(!limiter.is_rate_limited("zephyr"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_backoff_grows_delay_under_pressure() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(
            "zephyr",
            RateLimitConfig {
                max_requests_per_minute: 10,
                backoff_threshold: 0.5,
                backoff_factor: 2.0,
                max_delay: Duration::from_secs(30),
                ..config(100)
            },
        );

        for _ in 0..8 {
            limiter.throttle("zephyr").await;
        }

        let metrics = limiter.metrics("zephyr");
        assert!(metrics.current_delay > Duration::from_millis(100));
        assert_eq!(metrics.requests_last_minute, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_capped_at_max() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register(
            "zephyr",
            RateLimitConfig {
                max_requests_per_minute: 1,
                backoff_threshold: 0.1,
                backoff_factor: 100.0,
                max_delay: Duration::from_millis(500),
                ..config(100)
            },
        );

        for _ in 0..4 {
            limiter.throttle("zephyr").await;
        }
        assert!(limiter.metrics("zephyr").current_delay <= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_initial_state() {
        let limiter = AdaptiveRateLimiter::new();
        limiter.register("zephyr", config(100));

        limiter.throttle("zephyr").await;
        limiter.handle_rate_limit_response("zephyr", &http_429(&[("Retry-After", "60")]));

        limiter.reset("zephyr");
        let metrics = limiter.metrics("zephyr");
        assert_eq!(metrics.requests_last_minute, 0);
        assert_eq!(metrics.current_delay, Duration::from_millis(100));
        assert!(!metrics.is_rate_limited);

        let start = Instant::now();
        limiter.throttle("zephyr").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("soon"), None);
    }
}
