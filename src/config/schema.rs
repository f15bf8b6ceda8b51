//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend server definitions, in rotation order.
    pub backends: Vec<BackendConfig>,

    /// Backend pool behaviour.
    pub pool: PoolConfig,

    /// Per-client admission control.
    pub rate_limit: RateLimitConfig,

    /// External counter store backing the rate limiter.
    pub counter_store: CounterStoreConfig,

    /// Circuit breaker guarding the upstream pool.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Backend address (e.g., "http://localhost:8081" or "127.0.0.1:8081").
    pub address: String,
}

/// Backend pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PoolConfig {
    /// Re-admit a dead backend after this many seconds.
    /// Unset keeps dead backends out until an operator revives them.
    pub revive_after_secs: Option<u64>,
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable admission control.
    pub enabled: bool,

    /// Requests allowed per client per window.
    pub max_requests: u64,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Prefix for counter keys in the store.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 60,
            key_prefix: "rate_limit:".to_string(),
        }
    }
}

/// Which counter store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterStoreKind {
    Redis,
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CounterStoreConfig {
    pub kind: CounterStoreKind,

    /// Redis connection URL.
    pub url: String,

    /// Maximum pooled Redis connections.
    pub pool_max: usize,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            kind: CounterStoreKind::Redis,
            url: "redis://localhost:6379".to_string(),
            pool_max: 16,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Upstream name used in logs and metrics.
    pub name: String,

    /// Trial calls allowed while half-open.
    pub max_requests: u32,

    /// Closed-state counter reset period in seconds (0 = never).
    pub interval_secs: u64,

    /// Seconds to stay open before probing.
    pub open_timeout_secs: u64,

    /// Minimum requests before the failure ratio is evaluated.
    pub min_requests: u32,

    /// Failure ratio that trips the breaker.
    pub failure_ratio: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "backend-pool".to_string(),
            max_requests: 3,
            interval_secs: 0,
            open_timeout_secs: 10,
            min_requests: 5,
            failure_ratio: 0.6,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Absolute deadline for each outbound call in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { upstream_secs: 3 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8079".to_string(),
        }
    }
}
