//! Fixed-window rate limiting, classed by route.
//!
//! The route class (auth, AI, versioned API, everything else) only picks the
//! limit; the counter key is a hash of the caller identity and the request
//! path, so exhausting one route never blocks a different one. Unmatched
//! paths still get a key — identity plus whatever path was asked for.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clawdbot_core::config::SecurityConfig;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Which budget a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Auth,
    Ai,
    Api,
    General,
}

impl RouteClass {
    /// Classify a request path. Most specific prefix wins.
    pub fn of(path: &str) -> Self {
        if path == "/api/v1/register" || path == "/api/v1/login" {
            Self::Auth
        } else if path.starts_with("/api/v1/ai/") {
            Self::Ai
        } else if path.starts_with("/api/v1/") {
            Self::Api
        } else {
            Self::General
        }
    }

    pub fn limit(&self, config: &SecurityConfig) -> u32 {
        match self {
            Self::Auth => config.auth_rate_per_minute,
            Self::Ai => config.ai_rate_per_minute,
            Self::Api => config.api_rate_per_minute,
            Self::General => config.general_rate_per_minute,
        }
    }
}

/// Counter storage seam. The in-memory store below is the default; a shared
/// deployment can swap in something cross-process.
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` and return the count inside the
    /// current window plus seconds until the window resets.
    fn increment(&self, key: u64, window: Duration) -> (u32, u64);
}

/// Expired counters are swept opportunistically every this many increments,
/// so anonymous traffic churning through unique IPs cannot grow the map
/// without bound.
const SWEEP_INTERVAL: u64 = 1024;

#[derive(Default)]
struct Counters {
    map: HashMap<u64, (u32, Instant)>,
    ops: u64,
}

#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<Counters>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters currently resident, expired or not.
    pub fn len(&self) -> usize {
        self.counters.lock().map(|c| c.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: u64, window: Duration) -> (u32, u64) {
        let Ok(mut counters) = self.counters.lock() else {
            return (0, 0);
        };
        let now = Instant::now();
        counters.ops += 1;
        if counters.ops % SWEEP_INTERVAL == 0 {
            counters
                .map
                .retain(|_, (_, started)| now.duration_since(*started) < window);
        }
        let entry = counters.map.entry(key).or_insert((0, now));
        if now.duration_since(entry.1) >= window {
            *entry = (0, now);
        }
        entry.0 += 1;
        let elapsed = now.duration_since(entry.1);
        let remaining = window.saturating_sub(elapsed).as_secs().max(1);
        (entry.0, remaining)
    }
}

/// Verdict for one request.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Seconds until the window resets; meaningful when denied.
    pub retry_after: u64,
}

pub struct RateLimiter {
    config: SecurityConfig,
    store: Box<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            store: Box::new(MemoryCounterStore::new()),
        }
    }

    pub fn with_store(config: SecurityConfig, store: Box<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Charge one request against `identity`'s budget for `path`. The class
    /// picks the limit; the counter is per identity and path.
    pub fn check(&self, identity: &str, path: &str) -> RateDecision {
        let class = RouteClass::of(path);
        let limit = class.limit(&self.config);

        let mut hasher = std::hash::DefaultHasher::new();
        identity.hash(&mut hasher);
        path.hash(&mut hasher);
        let key = hasher.finish();

        let (count, retry_after) = self.store.increment(key, WINDOW);
        RateDecision {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(SecurityConfig::default())
    }

    #[test]
    fn test_route_classes() {
        assert_eq!(RouteClass::of("/api/v1/login"), RouteClass::Auth);
        assert_eq!(RouteClass::of("/api/v1/register"), RouteClass::Auth);
        assert_eq!(RouteClass::of("/api/v1/ai/price-suggestion"), RouteClass::Ai);
        assert_eq!(RouteClass::of("/api/v1/analytics/query"), RouteClass::Api);
        assert_eq!(RouteClass::of("/health"), RouteClass::General);
    }

    #[test]
    fn test_auth_allows_five_then_denies() {
        let limiter = limiter();
        for i in 0..5 {
            let d = limiter.check("user-1", "/api/v1/login");
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 4 - i);
        }
        let denied = limiter.check("user-1", "/api/v1/login");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after >= 1);
    }

    #[test]
    fn test_classes_have_separate_budgets() {
        let limiter = limiter();
        for _ in 0..5 {
            assert!(limiter.check("user-1", "/api/v1/login").allowed);
        }
        assert!(!limiter.check("user-1", "/api/v1/login").allowed);
        // Same user, different class: untouched budget
        let d = limiter.check("user-1", "/api/v1/properties");
        assert!(d.allowed);
        assert_eq!(d.remaining, 59);
    }

    #[test]
    fn test_routes_in_same_class_have_separate_budgets() {
        let limiter = limiter();
        for _ in 0..60 {
            assert!(limiter.check("user-1", "/api/v1/properties").allowed);
        }
        assert!(!limiter.check("user-1", "/api/v1/properties").allowed);
        // A different api route still has its full budget
        let d = limiter.check("user-1", "/api/v1/enquiries");
        assert!(d.allowed);
        assert_eq!(d.remaining, 59);
    }

    #[test]
    fn test_expired_counters_are_swept() {
        let store = MemoryCounterStore::new();
        // Zero-width window: every counter is expired by the next sweep
        for key in 0..(2 * SWEEP_INTERVAL) {
            store.increment(key, Duration::ZERO);
        }
        assert!(store.len() <= SWEEP_INTERVAL as usize);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check("user-1", "/api/v1/login");
        }
        assert!(!limiter.check("user-1", "/api/v1/login").allowed);
        assert!(limiter.check("user-2", "/api/v1/login").allowed);
    }

    #[test]
    fn test_window_resets() {
        struct TinyWindowStore(MemoryCounterStore);
        impl CounterStore for TinyWindowStore {
            fn increment(&self, key: u64, _window: Duration) -> (u32, u64) {
                self.0.increment(key, Duration::from_millis(10))
            }
        }
        let limiter = RateLimiter::with_store(
            SecurityConfig::default(),
            Box::new(TinyWindowStore(MemoryCounterStore::new())),
        );
        for _ in 0..6 {
            limiter.check("user-1", "/api/v1/login");
        }
        assert!(!limiter.check("user-1", "/api/v1/login").allowed);
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("user-1", "/api/v1/login").allowed);
    }
}
