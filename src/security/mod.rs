//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (resolve client identity, count against window)
//!         → counter_store.rs (INCR / EXPIRE)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to backend selection
//! ```
//!
//! # Design Decisions
//! - Fail closed: counter store errors reject the request
//! - No trust in client input beyond identity resolution

pub mod counter_store;
pub mod headers;
pub mod rate_limit;

pub use counter_store::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError};
pub use rate_limit::{client_identity, AdmissionController};
