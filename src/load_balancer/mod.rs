//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → pool.rs (lock cursor, scan for a live backend)
//!     → backend.rs (shared-lock liveness check per candidate)
//!     → Return backend or None (all dead)
//!
//! Forwarding failure
//!     → backend.rs (exclusive-lock mark dead)
//!     → excluded from subsequent selections
//! ```
//!
//! # Design Decisions
//! - The pool is an owned object passed explicitly to the dispatcher
//! - Liveness is per-backend, cursor is per-pool
//! - No active probing; recovery is operator-driven or cooldown-based

pub mod backend;
pub mod pool;

pub use backend::{AddressError, Backend};
pub use pool::BackendPool;
