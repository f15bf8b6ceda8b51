//! Breaker-guarded outbound HTTP client.
//!
//! # Responsibilities
//! - Send one request to one backend through the circuit breaker
//! - Bound each call by a fixed deadline
//! - Classify outcomes: transport error, timeout, or 5xx count as failures
//!
//! # Design Decisions
//! - The deadline covers connect + response head; the body streams after
//! - The outbound future is owned by the inbound handler, so an abandoned
//!   inbound request drops the outbound call with it

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::resilience::circuit_breaker::{BreakerError, CircuitBreaker};

/// Why a forwarded call failed.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("upstream answered {0}")]
    ServerError(StatusCode),
    #[error("could not build upstream request: {0}")]
    InvalidRequest(#[from] axum::http::uri::InvalidUriParts),
}

/// HTTP client wrapper that owns the breaker for its upstream.
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(breaker: CircuitBreaker, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            breaker,
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` through the breaker.
    ///
    /// A 5xx response is tallied as a breaker failure but still returned as
    /// `Ok` so the caller sees the upstream's own answer.
    pub async fn send(
        &self,
        request: Request<Body>,
    ) -> Result<Response<Incoming>, BreakerError<UpstreamFailure>> {
        let client = &self.client;
        let timeout = self.timeout;

        self.breaker
            .execute_classified(
                || async move {
                    match tokio::time::timeout(timeout, client.request(request)).await {
                        Ok(result) => result.map_err(UpstreamFailure::from),
                        Err(_) => Err(UpstreamFailure::Timeout(timeout)),
                    }
                },
                |result| matches!(result, Ok(response) if !response.status().is_server_error()),
            )
            .await
    }
}
