//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are tallied
//! - Open: upstream assumed down, calls fail fast until the open timeout
//! - Half-Open: a bounded number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests && failure ratio >= threshold
//! Open → Half-Open: open timeout elapsed (checked lazily on next call)
//! Half-Open → Closed: max_requests consecutive trial successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - Bookkeeping is under a mutex; the guarded call runs outside it, so
//!   concurrent calls to the same upstream are not serialized
//! - Every transition starts a new generation with fresh counters; outcomes
//!   of calls begun in an older generation are discarded
//! - A call dropped before completing gives its slot back instead of being
//!   counted as a success or a failure

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Tunables for a single breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Upstream identity used in logs and metrics.
    pub name: String,
    /// Trial calls admitted while half-open, and successes needed to close.
    pub max_requests: u32,
    /// Closed-state counter reset period. `None` never resets.
    pub interval: Option<Duration>,
    /// How long the breaker stays open before probing.
    pub open_timeout: Duration,
    /// Minimum sample size before the failure ratio is considered.
    pub min_requests: u32,
    /// Failure ratio at or above which the breaker trips.
    pub failure_ratio: f64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "backend-pool".to_string(),
            max_requests: 3,
            interval: None,
            open_timeout: Duration::from_secs(10),
            min_requests: 5,
            failure_ratio: 0.6,
        }
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            name: config.name.clone(),
            max_requests: config.max_requests,
            interval: (config.interval_secs > 0).then(|| Duration::from_secs(config.interval_secs)),
            open_timeout: Duration::from_secs(config.open_timeout_secs),
            min_requests: config.min_requests,
            failure_ratio: config.failure_ratio,
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Rejection or the wrapped operation's own error.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },
    #[error("circuit breaker '{name}' is half-open with no trial slots left")]
    TooManyRequests { name: String },
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
enum Phase {
    Closed { expiry: Option<Instant> },
    /// `None` when the deadline lies past the clock's range.
    Open { until: Option<Instant> },
    HalfOpen,
}

impl Phase {
    fn state(&self) -> BreakerState {
        match self {
            Phase::Closed { .. } => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen => BreakerState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    generation: u64,
    counts: Counts,
}

/// Per-upstream circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let expiry = settings.interval.and_then(|i| Instant::now().checked_add(i));
        metrics::set_breaker_state(&settings.name, BreakerState::Closed);
        Self {
            settings,
            inner: Mutex::new(Inner {
                phase: Phase::Closed { expiry },
                generation: 0,
                counts: Counts::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state, applying any timer-driven transition first.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now())
    }

    /// Snapshot of the counters in the current generation.
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Run `op` through the breaker, counting any `Err` as a failure.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(op, |result| result.is_ok()).await
    }

    /// Run `op` through the breaker with a custom success classifier.
    ///
    /// The operation's result is returned unchanged; the classifier only
    /// decides how the outcome is tallied.
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        op: F,
        is_success: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&Result<T, E>) -> bool,
    {
        let generation = self.before_request()?;
        let mut guard = CallGuard {
            breaker: self,
            generation,
            settled: false,
        };

        let result = op().await;
        guard.settle(is_success(&result));

        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    fn before_request<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut inner = self.lock();
        match self.current_state(&mut inner, Instant::now()) {
            BreakerState::Open => {
                return Err(BreakerError::Open {
                    name: self.settings.name.clone(),
                });
            }
            BreakerState::HalfOpen if inner.counts.requests >= self.settings.max_requests => {
                return Err(BreakerError::TooManyRequests {
                    name: self.settings.name.clone(),
                });
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(inner.generation)
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        let state = self.current_state(&mut inner, now);
        if generation != inner.generation {
            return;
        }

        if success {
            inner.counts.on_success();
            match state {
                BreakerState::Closed if self.ready_to_trip(&inner.counts) => {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
                BreakerState::HalfOpen
                    if inner.counts.consecutive_successes >= self.settings.max_requests =>
                {
                    self.set_state(&mut inner, BreakerState::Closed, now);
                }
                _ => {}
            }
        } else {
            inner.counts.on_failure();
            match state {
                BreakerState::Closed if self.ready_to_trip(&inner.counts) => {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
                BreakerState::HalfOpen => {
                    self.set_state(&mut inner, BreakerState::Open, now);
                }
                _ => {}
            }
        }
    }

    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        if generation == inner.generation {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
            tracing::debug!(breaker = %self.settings.name, "Abandoned call released its slot");
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.settings.min_requests
            && counts.failure_ratio() >= self.settings.failure_ratio
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> BreakerState {
        match inner.phase {
            Phase::Closed { expiry: Some(expiry) } if expiry <= now => {
                self.new_generation(inner, now);
            }
            Phase::Open { until: Some(until) } if until <= now => {
                self.set_state(inner, BreakerState::HalfOpen, now);
            }
            _ => {}
        }
        inner.phase.state()
    }

    fn set_state(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.phase.state();
        if from == to {
            return;
        }

        inner.phase = match to {
            BreakerState::Closed => Phase::Closed { expiry: None },
            BreakerState::Open => Phase::Open {
                until: now.checked_add(self.settings.open_timeout),
            },
            BreakerState::HalfOpen => Phase::HalfOpen,
        };
        self.new_generation(inner, now);

        let name = &self.settings.name;
        if to == BreakerState::Open {
            tracing::warn!(breaker = %name, from = %from, to = %to, "Circuit breaker state changed");
        } else {
            tracing::info!(breaker = %name, from = %from, to = %to, "Circuit breaker state changed");
        }
        metrics::record_breaker_transition(name, from, to);
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        if let Phase::Closed { expiry } = &mut inner.phase {
            *expiry = self.settings.interval.and_then(|i| now.checked_add(i));
        }
    }
}

/// Settles a call exactly once, releasing its slot if the call is dropped.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.generation);
        }
    }
}
