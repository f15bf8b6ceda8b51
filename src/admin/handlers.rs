use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::{BreakerState, Counts};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub backends_total: usize,
    pub backends_alive: usize,
    pub breaker_state: BreakerState,
    pub upstream_timeout_ms: u64,
    /// `None` when rate limiting is disabled.
    pub rate_limit: Option<RateLimitStatus>,
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub max_requests: u64,
    pub window_secs: u64,
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub address: String,
    pub alive: bool,
}

#[derive(Serialize)]
pub struct LivenessChange {
    pub name: String,
    pub alive: bool,
    pub changed: bool,
}

#[derive(Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub counts: Counts,
    pub min_requests: u32,
    pub failure_ratio: f64,
    pub max_requests: u32,
    pub open_timeout_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let pool = state.dispatcher.pool();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        backends_total: pool.len(),
        backends_alive: pool.alive_count(),
        breaker_state: state.dispatcher.breaker().state(),
        upstream_timeout_ms: state.dispatcher.upstream_timeout().as_millis() as u64,
        rate_limit: state.dispatcher.admission().map(|a| RateLimitStatus {
            max_requests: a.max_requests(),
            window_secs: a.window().as_secs(),
        }),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .dispatcher
        .pool()
        .backends()
        .iter()
        .map(|b| BackendStatus {
            name: b.name().to_string(),
            address: b.authority().to_string(),
            alive: b.is_alive(),
        })
        .collect();
    Json(statuses)
}

pub async fn mark_alive(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<LivenessChange>, StatusCode> {
    let changed = state
        .dispatcher
        .pool()
        .mark_alive(&name)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(LivenessChange {
        name,
        alive: true,
        changed,
    }))
}

pub async fn mark_dead(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<LivenessChange>, StatusCode> {
    let changed = state
        .dispatcher
        .pool()
        .mark_dead(&name)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(LivenessChange {
        name,
        alive: false,
        changed,
    }))
}

pub async fn get_breaker(State(state): State<AdminState>) -> Json<BreakerStatus> {
    let breaker = state.dispatcher.breaker();
    let settings = breaker.settings();
    Json(BreakerStatus {
        name: breaker.name().to_string(),
        state: breaker.state(),
        counts: breaker.counts(),
        min_requests: settings.min_requests,
        failure_ratio: settings.failure_ratio,
        max_requests: settings.max_requests,
        open_timeout_secs: settings.open_timeout.as_secs(),
    })
}
