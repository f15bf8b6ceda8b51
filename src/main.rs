//! API gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      GATEWAY                          │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌───────────┐   ┌──────────────┐      │
//!   ───────────────────┼─▶│  http   │──▶│ admission │──▶│ load_balancer│      │
//!                      │  │ server  │   │ (counter  │   │  round-robin │      │
//!                      │  └─────────┘   │  store)   │   │  live only   │      │
//!                      │                └───────────┘   └──────┬───────┘      │
//!                      │                                       ▼              │
//!   Client Response    │  ┌─────────────┐            ┌──────────────────┐     │
//!   ◀──────────────────┼──│ dispatcher  │◀───────────│ circuit breaker  │◀────┼── Backend
//!                      │  │ 502/503/429 │            │ + upstream client│     │
//!                      │  └─────────────┘            └──────────────────┘     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::admin::{setup_admin_router, AdminState};
use api_gateway::config::{self, BackendConfig, GatewayConfig};
use api_gateway::lifecycle::{wait_for_termination, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::security::counter_store;
use api_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "Rate-limited, circuit-breaking reverse proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the backend list (repeatable), e.g. http://localhost:8081.
    #[arg(short, long = "backend")]
    backends: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        rate_limit = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        breaker = %config.circuit_breaker.name,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = counter_store::from_config(&config.counter_store)?;
    let server = HttpServer::new(&config, store)?;
    let shutdown = Shutdown::new();

    let mut admin_task = None;
    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(server.dispatcher(), &config.admin.api_key));
        let mut admin_shutdown = shutdown.subscribe();
        admin_task = Some(tokio::spawn(async move {
            let served = axum::serve(admin_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_termination().await;
    shutdown.trigger();

    server_task.await??;
    if let Some(task) = admin_task {
        task.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn load(cli: &Cli) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };

    if let Some(port) = cli.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if !cli.backends.is_empty() {
        config.backends = cli
            .backends
            .iter()
            .enumerate()
            .map(|(i, address)| BackendConfig {
                name: format!("backend-{}", i + 1),
                address: address.clone(),
            })
            .collect();
    }

    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}
