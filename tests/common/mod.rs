//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

use api_gateway::config::{BackendConfig, CounterStoreKind, GatewayConfig};
use api_gateway::security::MemoryCounterStore;
use api_gateway::{Dispatcher, HttpServer, Shutdown};

/// Serve `router` on an ephemeral local port.
async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Start a mock backend that answers every request with `name`.
pub async fn start_mock_backend(name: &'static str) -> SocketAddr {
    serve(Router::new().fallback(move || async move { name })).await
}

/// Mock backend whose status code can be changed while it runs.
#[derive(Clone)]
pub struct ProgrammableBackend {
    pub addr: SocketAddr,
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
}

impl ProgrammableBackend {
    pub async fn start(status: u16) -> Self {
        let status = Arc::new(AtomicU16::new(status));
        let hits = Arc::new(AtomicUsize::new(0));

        let state = (status.clone(), hits.clone());
        let router = Router::new()
            .fallback(
                |State((status, hits)): State<(Arc<AtomicU16>, Arc<AtomicUsize>)>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let code = StatusCode::from_u16(status.load(Ordering::SeqCst))
                        .unwrap_or(StatusCode::OK);
                    (code, "programmable")
                },
            )
            .with_state(state);

        Self {
            addr: serve(router).await,
            status,
            hits,
        }
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a backend that answers only after `delay`.
pub async fn start_slow_backend(delay: std::time::Duration) -> SocketAddr {
    serve(Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    }))
    .await
}

/// Start a backend that reports the headers it received as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    let router = Router::new().fallback(|headers: HeaderMap| async move {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "host": get("host"),
            "x_forwarded_for": get("x-forwarded-for"),
            "x_forwarded_host": get("x-forwarded-host"),
            "x_forwarded_proto": get("x-forwarded-proto"),
        }))
    });
    serve(router).await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway config with an in-memory counter store and the given backends.
pub fn gateway_config(backends: &[SocketAddr]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.counter_store.kind = CounterStoreKind::Memory;
    config.backends = backends
        .iter()
        .enumerate()
        .map(|(i, addr)| BackendConfig {
            name: format!("backend-{}", i + 1),
            address: format!("http://{}", addr),
        })
        .collect();
    config
}

/// A running gateway under test.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let store = Arc::new(MemoryCounterStore::new());
    let server = HttpServer::new(&config, store).unwrap();
    let dispatcher = server.dispatcher();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestGateway {
        addr,
        dispatcher,
        shutdown,
    }
}

/// HTTP client that bypasses any proxy settings in the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
