//! Request dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → AdmissionController (429 / 500 on store failure)
//!     → BackendPool::select_next (503 when all dead)
//!     → rewrite authority + forwarding headers
//!     → UpstreamClient (breaker: 503 when open)
//!     → failure: mark backend dead, 502
//!     → success: stream response back
//! ```
//!
//! # Design Decisions
//! - One attempt per inbound request; no retry against another backend
//! - Pool, admission, and upstream client are owned here and passed in
//!   explicitly; nothing is global

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{
    uri::{PathAndQuery, Scheme},
    Request, Response, Uri, Version,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::load_balancer::{AddressError, Backend, BackendPool};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerError, BreakerSettings, CircuitBreaker};
use crate::resilience::upstream::{UpstreamClient, UpstreamFailure};
use crate::security::counter_store::CounterStore;
use crate::security::headers::{apply_forwarding_headers, strip_hop_by_hop};
use crate::security::rate_limit::{client_identity, AdmissionController};

/// Response extension naming the backend that served the request.
#[derive(Debug, Clone)]
pub struct SelectedBackend(pub Arc<Backend>);

/// Composes admission, selection, and guarded forwarding.
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    admission: Option<AdmissionController>,
    upstream: UpstreamClient,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<BackendPool>,
        admission: Option<AdmissionController>,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            pool,
            admission,
            upstream,
        }
    }

    /// Wire up a dispatcher from configuration and a counter store.
    pub fn from_config(
        config: &GatewayConfig,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, AddressError> {
        let revive_after = config.pool.revive_after_secs.map(Duration::from_secs);
        let pool = Arc::new(BackendPool::from_config(&config.backends, revive_after)?);

        let admission = config
            .rate_limit
            .enabled
            .then(|| AdmissionController::new(store, &config.rate_limit));

        let breaker = CircuitBreaker::new(BreakerSettings::from(&config.circuit_breaker));
        let upstream = UpstreamClient::new(breaker, Duration::from_secs(config.timeouts.upstream_secs));

        for backend in pool.backends() {
            metrics::record_backend_liveness(backend.authority(), true);
        }

        Ok(Self::new(pool, admission, upstream))
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        self.upstream.breaker()
    }

    /// Admission controller, or `None` when rate limiting is disabled.
    pub fn admission(&self) -> Option<&AdmissionController> {
        self.admission.as_ref()
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream.timeout()
    }

    /// Run one inbound request through the pipeline.
    pub async fn dispatch(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Response<Body>, GatewayError> {
        if let Some(admission) = &self.admission {
            let identity = client_identity(request.headers(), peer);
            admission.admit(&identity).await?;
        }

        let backend = self.pool.select_next().ok_or_else(|| {
            tracing::warn!(pool_size = self.pool.len(), "No live backend in pool");
            GatewayError::NoBackendAvailable
        })?;

        let outbound = match outbound_request(request, &backend, peer) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(backend = %backend.name(), error = %e, "Failed to build upstream request");
                return Err(GatewayError::Upstream {
                    backend: backend.name().to_string(),
                    source: e,
                });
            }
        };

        tracing::debug!(backend = %backend.name(), uri = %outbound.uri(), "Forwarding request");

        match self.upstream.send(outbound).await {
            Ok(response) if response.status().is_server_error() => {
                let status = response.status();
                Err(self.upstream_failed(&backend, UpstreamFailure::ServerError(status)))
            }
            Ok(response) => {
                metrics::record_upstream_outcome(backend.name(), "success");
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                parts.extensions.insert(SelectedBackend(backend.clone()));
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(BreakerError::Inner(failure)) => Err(self.upstream_failed(&backend, failure)),
            Err(BreakerError::Open { name }) | Err(BreakerError::TooManyRequests { name }) => {
                tracing::warn!(
                    breaker = %name,
                    backend = %backend.name(),
                    state = %self.breaker().state(),
                    "Circuit breaker rejected call"
                );
                metrics::record_upstream_outcome(backend.name(), "rejected");
                Err(GatewayError::BreakerOpen { breaker: name })
            }
        }
    }

    fn upstream_failed(&self, backend: &Backend, failure: UpstreamFailure) -> GatewayError {
        tracing::error!(
            backend = %backend.name(),
            address = %backend.authority(),
            error = %failure,
            "Upstream request failed"
        );
        if backend.mark_dead() {
            tracing::warn!(
                backend = %backend.name(),
                address = %backend.authority(),
                "Backend marked dead"
            );
            metrics::record_backend_liveness(backend.authority(), false);
        }
        metrics::record_upstream_outcome(backend.name(), "failure");

        GatewayError::Upstream {
            backend: backend.name().to_string(),
            source: failure,
        }
    }
}

/// Rewrite the inbound request to target `backend`.
fn outbound_request(
    request: Request<Body>,
    backend: &Backend,
    peer: SocketAddr,
) -> Result<Request<Body>, UpstreamFailure> {
    let (mut parts, body) = request.into_parts();

    apply_forwarding_headers(&mut parts.headers, peer.ip(), backend.authority());

    let mut uri_parts = parts.uri.into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(backend.uri_authority().clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = Uri::from_parts(uri_parts)?;
    parts.version = Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Method};

    #[test]
    fn test_outbound_request_rewrite() {
        let backend = Backend::new("api-1", "http://127.0.0.1:8081").unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users/7?full=true")
            .header(header::HOST, "gateway.local")
            .header(header::CONNECTION, "close")
            .header("x-custom", "kept")
            .body(Body::from("payload"))
            .unwrap();

        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();
        let out = outbound_request(request, &backend, peer).unwrap();

        assert_eq!(out.method(), Method::POST);
        assert_eq!(out.uri().to_string(), "http://127.0.0.1:8081/users/7?full=true");
        assert_eq!(out.headers()[header::HOST], "127.0.0.1:8081");
        assert_eq!(out.headers()["x-forwarded-host"], "gateway.local");
        assert_eq!(out.headers()["x-forwarded-for"], "198.51.100.4");
        assert_eq!(out.headers()["x-custom"], "kept");
        assert!(out.headers().get(header::CONNECTION).is_none());
    }

    fn dispatcher(backends: &[(&str, &str)]) -> Dispatcher {
        let mut config = GatewayConfig::default();
        config.rate_limit.enabled = false;
        for (name, address) in backends {
            config.backends.push(crate::config::BackendConfig {
                name: name.to_string(),
                address: address.to_string(),
            });
        }
        let store = Arc::new(crate::security::MemoryCounterStore::new());
        Dispatcher::from_config(&config, store).unwrap()
    }

    #[tokio::test]
    async fn test_response_names_selected_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(|| async { "ok" });
            let _ = axum::serve(listener, app).await;
        });

        let address = addr.to_string();
        let d = dispatcher(&[("api-1", address.as_str())]);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = d
            .dispatch(request, "127.0.0.1:5000".parse().unwrap())
            .await
            .unwrap();

        let selected = response.extensions().get::<SelectedBackend>().unwrap();
        assert_eq!(selected.0.name(), "api-1");
    }

    #[tokio::test]
    async fn test_all_dead_is_unavailable() {
        let d = dispatcher(&[("a", "127.0.0.1:1"), ("b", "127.0.0.1:2")]);
        d.pool().mark_dead("a");
        d.pool().mark_dead("b");

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = d
            .dispatch(request, "127.0.0.1:5000".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoBackendAvailable));
    }
}
