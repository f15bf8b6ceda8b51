//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, peer address)
//!     → dispatcher.rs (admission → selection → guarded forward)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod server;

pub use dispatcher::{Dispatcher, SelectedBackend};
pub use server::{AppState, HttpServer};
