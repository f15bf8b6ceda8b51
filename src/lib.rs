//! Reverse-proxying API gateway library.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
