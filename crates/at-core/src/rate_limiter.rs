//! Three-tier fixed-window rate limiter: global, per-caller, per-endpoint
//! (SPEC_FULL.md §7, `rate_limited` error kind). `at-gateway` wraps this in
//! a tower middleware; exposed here because it is an ambient concern the
//! daemon's `Runtime` owns, not a gateway-only detail.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_second(limit: u32) -> Self {
        Self { limit, window: Duration::from_secs(1) }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self { limit, window: Duration::from_secs(60) }
    }

    pub fn per_hour(limit: u32) -> Self {
        Self { limit, window: Duration::from_secs(3600) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded ({scope})")]
    Exceeded { scope: &'static str, retry_after: Duration },
}

struct Window {
    started_at: Instant,
    count: u32,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self { started_at: now, count: 0 }
    }
}

fn check(window: &Mutex<Window>, config: &RateLimitConfig, scope: &'static str) -> Result<(), RateLimitError> {
    let now = Instant::now();
    let mut w = window.lock().unwrap();
    if now.duration_since(w.started_at) >= config.window {
        *w = Window::fresh(now);
    }
    if w.count >= config.limit {
        let retry_after = config.window.saturating_sub(now.duration_since(w.started_at));
        return Err(RateLimitError::Exceeded { scope, retry_after });
    }
    w.count += 1;
    Ok(())
}

/// Global + per-key + per-endpoint caps, each its own fixed window. All
/// three must pass for a request through.
pub struct MultiKeyRateLimiter {
    global_config: RateLimitConfig,
    per_key_config: RateLimitConfig,
    per_endpoint_config: RateLimitConfig,
    global: Mutex<Window>,
    per_key: DashMap<String, Mutex<Window>>,
    per_endpoint: DashMap<String, Mutex<Window>>,
}

impl MultiKeyRateLimiter {
    pub fn new(global: RateLimitConfig, per_key: RateLimitConfig, per_endpoint: RateLimitConfig) -> Self {
        Self {
            global_config: global,
            per_key_config: per_key,
            per_endpoint_config: per_endpoint,
            global: Mutex::new(Window::fresh(Instant::now())),
            per_key: DashMap::new(),
            per_endpoint: DashMap::new(),
        }
    }

    pub fn check_all(&self, key: &str, endpoint: &str) -> Result<(), RateLimitError> {
        check(&self.global, &self.global_config, "global")?;

        let key_window = self.per_key.entry(key.to_string()).or_insert_with(|| Mutex::new(Window::fresh(Instant::now())));
        check(&key_window, &self.per_key_config, "per_key")?;

        let endpoint_window = self
            .per_endpoint
            .entry(endpoint.to_string())
            .or_insert_with(|| Mutex::new(Window::fresh(Instant::now())));
        check(&endpoint_window, &self.per_endpoint_config, "per_endpoint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_limit() {
        let limiter = MultiKeyRateLimiter::new(
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(10),
            RateLimitConfig::per_second(5),
        );
        assert!(limiter.check_all("u1", "/ping").is_ok());
        assert!(limiter.check_all("u1", "/ping").is_ok());
    }

    #[test]
    fn rejects_once_per_endpoint_cap_is_hit() {
        let limiter = MultiKeyRateLimiter::new(
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(2),
        );
        assert!(limiter.check_all("u1", "/ping").is_ok());
        assert!(limiter.check_all("u1", "/ping").is_ok());
        assert!(limiter.check_all("u1", "/ping").is_err());
    }

    #[test]
    fn different_keys_have_independent_budgets() {
        let limiter = MultiKeyRateLimiter::new(
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(1),
            RateLimitConfig::per_second(100),
        );
        assert!(limiter.check_all("u1", "/a").is_ok());
        assert!(limiter.check_all("u2", "/a").is_ok());
    }

    #[test]
    fn different_endpoints_have_independent_budgets() {
        let limiter = MultiKeyRateLimiter::new(
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(1),
        );
        assert!(limiter.check_all("u1", "/a").is_ok());
        assert!(limiter.check_all("u1", "/b").is_ok());
    }

    #[test]
    fn window_resets_after_elapsed_duration() {
        let limiter = MultiKeyRateLimiter::new(
            RateLimitConfig::per_second(100),
            RateLimitConfig::per_second(100),
            RateLimitConfig { limit: 1, window: Duration::from_millis(20) },
        );
        assert!(limiter.check_all("u1", "/a").is_ok());
        assert!(limiter.check_all("u1", "/a").is_err());
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check_all("u1", "/a").is_ok());
    }
}
