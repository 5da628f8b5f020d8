//! Circuit breaker gating calls to the external callables.
//!
//! Per named service: closed → open after N consecutive failures;
//! open → half-open after the reset timeout; half-open admits a bounded
//! number of probes and closes only when all of them succeed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use engram_core::config::CircuitBreakerConfig;
use engram_core::errors::{EngramError, EngramResult};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time statistics for a breaker.
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: usize,
    /// Probes admitted since entering half-open.
    half_open_admitted: usize,
    /// Probes that succeeded since entering half-open.
    half_open_successes: usize,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_admitted: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    /// Run `f` under the breaker. Fails fast with `CircuitBreakerOpen`
    /// when the breaker rejects the call; otherwise the outcome of `f`
    /// is recorded and returned unchanged.
    pub fn call<T>(&self, f: impl FnOnce() -> EngramResult<T>) -> EngramResult<T> {
        self.acquire()?;
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Current state, applying the open → half-open timer transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        self.transition_if_due(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> BreakerStats {
        let state = self.state();
        let inner = self.inner.lock().unwrap();
        BreakerStats {
            service: self.service.clone(),
            state,
            consecutive_failures: inner.consecutive_failures,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Force the breaker closed (operator action).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }

    fn acquire(&self) -> EngramResult<()> {
        let mut inner = self.inner.lock().unwrap();
        self.transition_if_due(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                Err(EngramError::CircuitBreakerOpen {
                    service: self.service.clone(),
                })
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted >= self.config.half_open_max_calls {
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    return Err(EngramError::CircuitBreakerOpen {
                        service: self.service.clone(),
                    });
                }
                inner.half_open_admitted += 1;
                Ok(())
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    tracing::info!(service = %self.service, "circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_admitted = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        service = %self.service,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                    Self::open(&mut inner);
                }
            }
            // Any half-open failure reopens and restarts the timer.
            CircuitState::HalfOpen => {
                tracing::warn!(service = %self.service, "probe failed, circuit breaker reopened");
                Self::open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
    }

    fn transition_if_due(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let reset_after = Duration::from_secs(self.config.reset_timeout_s);
        if inner
            .opened_at
            .map(|t| t.elapsed() >= reset_after)
            .unwrap_or(false)
        {
            tracing::info!(service = %self.service, "circuit breaker half-open");
            inner.state = CircuitState::HalfOpen;
            inner.half_open_admitted = 0;
            inner.half_open_successes = 0;
        }
    }
}
