//! Fixed-window admission control per client identity.
//!
//! # Algorithm
//! ```text
//! count = INCR rate_limit:{identity}
//! if count == 1: EXPIRE rate_limit:{identity} window
//! if count > max_requests: deny
//! ```
//!
//! # Design Decisions
//! - Fixed window: up to twice the nominal rate can pass across a window
//!   boundary; accepted for simplicity
//! - Fail closed: a counter store error fails the request with a 500
//!   instead of silently allowing or denying
//! - Identity prefers the first X-Forwarded-For hop, then the peer IP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::counter_store::CounterStore;
use crate::security::headers::X_FORWARDED_FOR;

/// Resolve the identity a request is budgeted against.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Per-client request budget backed by an external counter store.
pub struct AdmissionController {
    store: Arc<dyn CounterStore>,
    max_requests: u64,
    window: Duration,
    key_prefix: String,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            key_prefix: config.key_prefix.clone(),
        }
    }

    pub fn key_for(&self, identity: &str) -> String {
        format!("{}{}", self.key_prefix, identity)
    }

    /// Count one request for `identity`. Returns the count in the current
    /// window when admitted.
    pub async fn admit(&self, identity: &str) -> Result<u64, GatewayError> {
        let key = self.key_for(identity);

        let count = self.store.increment(&key).await.map_err(|e| {
            tracing::error!(identity = %identity, error = %e, "Counter store increment failed");
            GatewayError::CounterStore(e)
        })?;

        if count == 1 {
            self.store.set_expiry(&key, self.window).await.map_err(|e| {
                tracing::error!(identity = %identity, error = %e, "Counter store expiry failed");
                GatewayError::CounterStore(e)
            })?;
        }

        if count > self.max_requests {
            tracing::warn!(
                identity = %identity,
                count,
                limit = self.max_requests,
                "Rate limit exceeded"
            );
            metrics::record_admission_denied();
            return Err(GatewayError::AdmissionDenied {
                identity: identity.to_string(),
            });
        }

        Ok(count)
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::counter_store::{MemoryCounterStore, StoreError};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn peer() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    fn controller(store: Arc<dyn CounterStore>) -> AdmissionController {
        AdmissionController::new(store, &RateLimitConfig::default())
    }

    #[test]
    fn test_identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.9 , 10.1.1.1"));
        assert_eq!(client_identity(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_identity_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, peer()), "10.0.0.7");

        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" , 10.1.1.1"));
        assert_eq!(client_identity(&headers, peer()), "10.0.0.7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_budget() {
        let store = Arc::new(MemoryCounterStore::new());
        let admission = controller(store.clone());

        for i in 1..=100 {
            assert_eq!(admission.admit("1.2.3.4").await.unwrap(), i);
        }
        assert!(matches!(
            admission.admit("1.2.3.4").await,
            Err(GatewayError::AdmissionDenied { ref identity }) if identity == "1.2.3.4"
        ));

        // Other clients have their own budget
        assert_eq!(admission.admit("5.6.7.8").await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(admission.admit("1.2.3.4").await.unwrap(), 1);
        assert_eq!(store.get("rate_limit:1.2.3.4"), Some(1));
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let admission = controller(Arc::new(FailingStore));
        assert!(matches!(
            admission.admit("1.2.3.4").await,
            Err(GatewayError::CounterStore(_))
        ));
    }

    #[derive(Default)]
    struct CountingStore {
        expiries: AtomicU32,
        inner: MemoryCounterStore,
    }

    #[async_trait]
    impl CounterStore for CountingStore {
        async fn increment(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.increment(key).await
        }

        async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            self.expiries.fetch_add(1, Ordering::SeqCst);
            self.inner.set_expiry(key, ttl).await
        }
    }

    #[tokio::test]
    async fn test_expiry_set_once_per_window() {
        let store = Arc::new(CountingStore::default());
        let admission = controller(store.clone());
        for _ in 0..10 {
            admission.admit("1.2.3.4").await.unwrap();
        }
        assert_eq!(store.expiries.load(Ordering::SeqCst), 1);
    }
}
