//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log stream
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every failure log names the backend or breaker involved
//! - Request ID flows from the inbound request to the backend
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
