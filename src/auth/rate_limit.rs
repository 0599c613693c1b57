//! Fixed-window rate limiting for sensitive endpoints.
//!
//! Flow Overview:
//! 1) Build a key from the limiter name and the caller discriminator (submitted
//!    username/email, else network address).
//! 2) First hit, or a hit after the window elapsed, starts a fresh window with count 1.
//! 3) Inside the window, hits beyond `max_attempts` are rejected and not counted.
//!
//! Records live in a [`RecordStore`]; the in-memory table is lost on restart,
//! which only loosens limits temporarily.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

use super::error::AuthError;

// Stale windows are swept once the table grows past this many keys.
const PURGE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterConfig {
    pub name: &'static str,
    pub max_attempts: u32,
    pub window: Duration,
}

impl LimiterConfig {
    pub const LOGIN: Self = Self::new("login", 5, Duration::from_secs(15 * 60));
    pub const PASSWORD_RESET: Self = Self::new("password-reset", 3, Duration::from_secs(60 * 60));
    pub const PUBLIC_WRITE: Self = Self::new("public-write", 5, Duration::from_secs(60 * 60));
    pub const AI_ASSIST: Self = Self::new("ai-assist", 10, Duration::from_secs(60 * 60));
    pub const GLOBAL: Self = Self::new("global", 200, Duration::from_secs(15 * 60));

    #[must_use]
    pub const fn new(name: &'static str, max_attempts: u32, window: Duration) -> Self {
        Self {
            name,
            max_attempts,
            window,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRecord {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Who a request is counted against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discriminator {
    Identity(String),
    Address(String),
    Unknown,
}

impl Discriminator {
    /// Prefer an identity submitted in the body, then the network address.
    #[must_use]
    pub fn from_request(identity: Option<&str>, address: Option<&str>) -> Self {
        let identity = identity.map(str::trim).filter(|value| !value.is_empty());
        if let Some(identity) = identity {
            return Self::Identity(identity.to_lowercase());
        }
        match address.map(str::trim).filter(|value| !value.is_empty()) {
            Some(address) => Self::Address(address.to_string()),
            None => Self::Unknown,
        }
    }

    fn key(&self, limiter: &str) -> String {
        match self {
            Self::Identity(value) => format!("{limiter}:id:{value}"),
            Self::Address(value) => format!("{limiter}:ip:{value}"),
            Self::Unknown => format!("{limiter}:unknown"),
        }
    }
}

/// Storage for window records, keyed by `limiter:discriminator`.
pub trait RecordStore: Send + Sync {
    /// Replace the record under `key` with `apply(current)` as one exclusive step.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<WindowRecord>) -> WindowRecord,
    ) -> WindowRecord;

    /// Drop every record for which `keep` returns `false`.
    fn retain(&self, keep: &mut dyn FnMut(&WindowRecord) -> bool);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, WindowRecord>>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<WindowRecord>) -> WindowRecord,
    ) -> WindowRecord {
        let mut records = self.records.lock();
        let next = apply(records.get(key).copied());
        records.insert(key.to_string(), next);
        next
    }

    fn retain(&self, keep: &mut dyn FnMut(&WindowRecord) -> bool) {
        self.records.lock().retain(|_, record| keep(record));
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, discriminator: &Discriminator) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _discriminator: &Discriminator) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    config: LimiterConfig,
    store: Arc<dyn RecordStore>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(config: LimiterConfig, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store }
    }

    /// Limiter over a private in-memory table.
    #[must_use]
    pub fn in_memory(config: LimiterConfig) -> Self {
        Self::new(config, Arc::new(MemoryRecordStore::new()))
    }

    #[must_use]
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Count a hit at `now` and decide whether it may proceed.
    pub fn check_at(&self, discriminator: &Discriminator, now: Instant) -> RateLimitDecision {
        let window = self.config.window;
        let max_attempts = self.config.max_attempts;
        let mut decision = RateLimitDecision::Allowed;

        let key = discriminator.key(self.config.name);
        self.store.update(&key, &mut |current| match current {
            Some(record) if now.saturating_duration_since(record.window_start) <= window => {
                if record.count >= max_attempts {
                    let elapsed = now.saturating_duration_since(record.window_start);
                    decision = RateLimitDecision::Limited {
                        retry_after: window.saturating_sub(elapsed),
                    };
                    record
                } else {
                    decision = RateLimitDecision::Allowed;
                    WindowRecord {
                        count: record.count + 1,
                        window_start: record.window_start,
                    }
                }
            }
            _ => {
                decision = RateLimitDecision::Allowed;
                WindowRecord {
                    count: 1,
                    window_start: now,
                }
            }
        });

        if self.store.len() > PURGE_THRESHOLD {
            self.store.retain(&mut |record| {
                now.saturating_duration_since(record.window_start) <= window
            });
        }

        if let RateLimitDecision::Limited { .. } = decision {
            warn!(
                limiter = self.config.name,
                discriminator = ?discriminator,
                max_attempts,
                "Rate limit exceeded"
            );
        }

        decision
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, discriminator: &Discriminator) -> RateLimitDecision {
        self.check_at(discriminator, Instant::now())
    }
}

/// Limiters used by the session endpoints and the router.
#[derive(Clone)]
pub struct Limiters {
    pub login: Arc<dyn RateLimiter>,
    pub password_change: Arc<dyn RateLimiter>,
    pub global: Arc<dyn RateLimiter>,
}

impl Limiters {
    /// Recommended presets, each over its own in-memory table.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            login: Arc::new(FixedWindowLimiter::in_memory(LimiterConfig::LOGIN)),
            password_change: Arc::new(FixedWindowLimiter::in_memory(
                LimiterConfig::PASSWORD_RESET,
            )),
            global: Arc::new(FixedWindowLimiter::in_memory(LimiterConfig::GLOBAL)),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            login: Arc::new(NoopRateLimiter),
            password_change: Arc::new(NoopRateLimiter),
            global: Arc::new(NoopRateLimiter),
        }
    }

    #[must_use]
    pub fn with_login(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.login = limiter;
        self
    }

    #[must_use]
    pub fn with_password_change(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.password_change = limiter;
        self
    }

    #[must_use]
    pub fn with_global(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.global = limiter;
        self
    }
}

impl Default for Limiters {
    fn default() -> Self {
        Self::standard()
    }
}

/// Whole seconds until the window reopens, rounded up and never zero.
#[must_use]
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    seconds.max(1)
}

/// Check `limiter` and turn a rejection into [`AuthError::RateLimited`].
///
/// # Errors
/// `RateLimited` when the discriminator is over its limit.
pub fn enforce(limiter: &dyn RateLimiter, discriminator: &Discriminator) -> Result<(), AuthError> {
    match limiter.check(discriminator) {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after } => Err(AuthError::RateLimited {
            retry_after_seconds: retry_after_seconds(retry_after),
        }),
    }
}
