//! Circuit Breaker (C2) — one breaker per source.
//!
//! State transition is the only critical section, protected by a
//! `parking_lot::Mutex` (the same lock crate `vantage` already depends on,
//! reused here rather than introducing a second one).

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::{BreakerError, SourceErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for one breaker. The three constructors below are the three
/// default profiles used across the adapter roster.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_window: Duration,
}

impl BreakerConfig {
    /// F=5, T_recover=60s — LLM and metadata sources.
    #[must_use]
    pub const fn llm_or_metadata() -> Self {
        Self {
            failure_threshold: 5,
            recovery_window: Duration::from_secs(60),
        }
    }

    /// F=3, T_recover=120s — expensive external APIs (registry, places,
    /// people, LinkedIn).
    #[must_use]
    pub const fn expensive_external() -> Self {
        Self {
            failure_threshold: 3,
            recovery_window: Duration::from_secs(120),
        }
    }

    /// F=10, T_recover=30s — the durable store.
    #[must_use]
    pub const fn store() -> Self {
        Self {
            failure_threshold: 10,
            recovery_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_success_at: Option<Instant>,
}

/// Three-state failure gate wrapping any fallible call.
///
/// Statistics are in-memory and process-local: a single process owns one
/// breaker per source. `CircuitBreakerState` (the persisted-facing view in
/// [`crate::domain`]) is derived from this at read time; it is not the
/// source of truth.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                last_success_at: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, first resolving an OPEN breaker whose recovery
    /// window has elapsed into HALF_OPEN (a read can trigger this
    /// transition; it does not require a call attempt).
    #[must_use]
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);
        inner.state
    }

    fn maybe_recover(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.recovery_window {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
    }

    /// Whether a call should be allowed through right now. When `false`,
    /// callers must short-circuit with `error_kind=breaker_open` *before*
    /// issuing any network call.
    #[must_use]
    pub fn allow_call(&self) -> bool {
        self.state() != BreakerState::Open
    }

    /// Guard returning [`BreakerError::Open`] when the breaker is open,
    /// for call sites that prefer `?` over matching on [`Self::allow_call`].
    pub fn guard(&self) -> Result<(), BreakerError> {
        if self.allow_call() {
            Ok(())
        } else {
            Err(BreakerError::Open(self.name.clone()))
        }
    }

    /// Record the outcome of a call. `error_kind=not_found` is not a
    /// failure; pass `None` to record a success-equivalent outcome for
    /// breaker purposes.
    pub fn record_outcome(&self, error_kind: Option<SourceErrorKind>) {
        let counts_as_failure = error_kind.is_some_and(SourceErrorKind::counts_as_failure);
        let mut inner = self.inner.lock();
        self.maybe_recover(&mut inner);

        if counts_as_failure {
            match inner.state {
                BreakerState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                }
                BreakerState::HalfOpen => {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
                BreakerState::Open => {}
            }
        } else {
            inner.last_success_at = Some(Instant::now());
            match inner.state {
                BreakerState::Closed => {
                    inner.consecutive_failures = 0;
                }
                BreakerState::HalfOpen => {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                }
                BreakerState::Open => {}
            }
        }
    }
}

/// Process-wide registry owning the one breaker per source the engine is
/// allowed to have.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: std::sync::RwLock<rustc_hash::FxHashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the breaker for `name`, creating it with `config` on first use.
    pub fn get_or_create(
        &self,
        name: &str,
        config: BreakerConfig,
    ) -> std::sync::Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(name) {
            return std::sync::Arc::clone(existing);
        }
        let mut write = self.breakers.write().unwrap();
        std::sync::Arc::clone(
            write
                .entry(name.to_string())
                .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(name, config))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            recovery_window: Duration::from_millis(10),
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", fast_config());
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_outcome(Some(SourceErrorKind::Timeout));
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_outcome(Some(SourceErrorKind::Timeout));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_call());
    }

    #[test]
    fn not_found_never_opens_the_breaker() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..10 {
            breaker.record_outcome(Some(SourceErrorKind::NotFound));
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_after_recovery_window_then_closes_on_success() {
        let breaker = CircuitBreaker::new("test", fast_config());
        breaker.record_outcome(Some(SourceErrorKind::Network));
        breaker.record_outcome(Some(SourceErrorKind::Network));
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_outcome(None);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_the_breaker() {
        let breaker = CircuitBreaker::new("test", fast_config());
        breaker.record_outcome(Some(SourceErrorKind::Network));
        breaker.record_outcome(Some(SourceErrorKind::Network));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_outcome(Some(SourceErrorKind::Network));
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
