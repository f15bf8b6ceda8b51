//! Request-path error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::resilience::upstream::UpstreamFailure;
use crate::security::counter_store::StoreError;

/// Every way a proxied request can fail inside the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Client exceeded its admission window budget.
    #[error("client '{identity}' exceeded its request budget")]
    AdmissionDenied { identity: String },

    /// Every backend in the pool is marked dead.
    #[error("no live backend available")]
    NoBackendAvailable,

    /// The upstream breaker rejected the call without contacting a backend.
    #[error("circuit breaker '{breaker}' is rejecting calls")]
    BreakerOpen { breaker: String },

    /// The selected backend was unreachable or answered with a server error.
    #[error("upstream '{backend}' failed: {source}")]
    Upstream {
        backend: String,
        #[source]
        source: UpstreamFailure,
    },

    /// The counter store behind admission control failed.
    #[error(transparent)]
    CounterStore(#[from] StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionDenied { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoBackendAvailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::CounterStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Backend the request was forwarded to before failing, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            GatewayError::Upstream { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Client-facing message; never exposes backend identities.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::AdmissionDenied { .. } => "Too Many Requests",
            GatewayError::NoBackendAvailable => "No backend available",
            GatewayError::BreakerOpen { .. } => "Upstream temporarily unavailable",
            GatewayError::Upstream { .. } => "Bad Gateway",
            GatewayError::CounterStore(_) => "Rate limiter unavailable",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                GatewayError::AdmissionDenied { identity: "1.2.3.4".into() },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (GatewayError::NoBackendAvailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                GatewayError::BreakerOpen { breaker: "pool".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::Upstream {
                    backend: "a".into(),
                    source: UpstreamFailure::Timeout(Duration::from_secs(3)),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::CounterStore(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_messages_name_the_culprit() {
        let err = GatewayError::Upstream {
            backend: "api-2".into(),
            source: UpstreamFailure::ServerError(StatusCode::INTERNAL_SERVER_ERROR),
        };
        assert!(err.to_string().contains("api-2"));
        assert_eq!(err.public_message(), "Bad Gateway");
        assert_eq!(err.backend(), Some("api-2"));
        assert_eq!(GatewayError::NoBackendAvailable.backend(), None);
    }
}
