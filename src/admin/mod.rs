//! Operator API.
//!
//! The only way a dead backend returns to rotation (absent a configured
//! cooldown) is an operator marking it alive here.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::http::Dispatcher;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub dispatcher: Arc<Dispatcher>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(dispatcher: Arc<Dispatcher>, api_key: &str) -> Self {
        Self {
            dispatcher,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/backends/{name}/alive", post(mark_alive))
        .route("/admin/backends/{name}/dead", post(mark_dead))
        .route("/admin/breaker", get(get_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
