use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::config::{lookup_bool, lookup_parsed, ConfigError};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: usize,
}

/// Fixed window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, Window>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited. The window for a key opens
    /// on its first hit and resets once `window` has elapsed.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert(Window { started: now, hits: 0 });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.hits = 0;
        }
        if entry.hits < limit {
            entry.hits += 1;
            true
        } else {
            false
        }
    }

    /// Drop keys whose window has already closed.
    pub fn purge_expired(&self, window: Duration) {
        let now = Instant::now();
        self.store.retain(|_, w| now.duration_since(w.started) < window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub register_limit: usize,
    pub register_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true, register_limit: 100, register_window: Duration::from_secs(15 * 60) }
    }
}

impl RateLimitConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            enabled: lookup_bool(get, "RATE_LIMIT_ENABLED", defaults.enabled)?,
            register_limit: lookup_parsed(get, "RL_REGISTER_LIMIT", defaults.register_limit)?,
            register_window: Duration::from_secs(lookup_parsed(
                get,
                "RL_REGISTER_WINDOW",
                defaults.register_window.as_secs(),
            )?),
        })
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn from_config(cfg: RateLimitConfig) -> Self {
        Self::new(InMemoryRateLimiter::new(cfg.enabled), cfg)
    }

    pub fn allow_register(&self, ip: &str) -> bool {
        self.limiter.check(&format!("register:{ip}"), self.cfg.register_limit, self.cfg.register_window)
    }
}
