//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → upstream.rs (fixed deadline on the outbound call)
//!     → circuit_breaker.rs (fail fast when open, tally outcome otherwise)
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline
//! - No retries or backoff; a failed request fails once
//! - Healing happens only through the breaker's own timers

pub mod circuit_breaker;
pub mod upstream;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker, Counts};
pub use upstream::{UpstreamClient, UpstreamFailure};
