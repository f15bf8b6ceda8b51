//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener with peer address info
//! - Hand every request to the dispatcher
//! - Stop accepting on shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::dispatcher::{Dispatcher, SelectedBackend};
use crate::load_balancer::AddressError;
use crate::observability::metrics;
use crate::security::counter_store::CounterStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &GatewayConfig, store: Arc<dyn CounterStore>) -> Result<Self, AddressError> {
        let dispatcher = Arc::new(Dispatcher::from_config(config, store)?);
        Ok(Self::with_dispatcher(dispatcher))
    }

    /// Create a server around an already-built dispatcher.
    pub fn with_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState {
            dispatcher: dispatcher.clone(),
        };
        Self {
            router: Self::build_router(state),
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Shared dispatcher, e.g. for the admin API.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.dispatcher.pool().len(),
            breaker = %self.dispatcher.breaker().name(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let (response, backend) = match state.dispatcher.dispatch(request, peer).await {
        Ok(response) => {
            let backend = response
                .extensions()
                .get::<SelectedBackend>()
                .map(|selected| selected.0.name().to_string());
            (response, backend)
        }
        Err(err) => {
            let backend = err.backend().map(str::to_string);
            (err.into_response(), backend)
        }
    };

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        backend.as_deref().unwrap_or("none"),
        start,
    );
    response
}
