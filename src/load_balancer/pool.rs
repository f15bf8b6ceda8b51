//! Backend pool management and round-robin selection.
//!
//! # Responsibilities
//! - Own the fixed, ordered set of backends
//! - Rotate a cursor through the set, skipping dead backends
//! - Expose mark-alive/mark-dead by backend name for operators
//!
//! # Design Decisions
//! - Selection and cursor advance happen under one mutex; the critical
//!   section is O(pool size) and never performs I/O
//! - The cursor lands just past the returned backend, so a dead backend
//!   does not shift the rotation of the live ones
//! - Dead backends stay dead until re-marked, unless a revive cooldown is
//!   configured

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::BackendConfig;
use crate::load_balancer::backend::{AddressError, Backend};
use crate::observability::metrics;

/// Ordered pool of backends plus the rotation cursor.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    cursor: Mutex<usize>,
    revive_after: Option<Duration>,
}

impl BackendPool {
    pub fn new(backends: Vec<Backend>, revive_after: Option<Duration>) -> Self {
        Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            cursor: Mutex::new(0),
            revive_after,
        }
    }

    /// Build the pool from configuration.
    pub fn from_config(
        configs: &[BackendConfig],
        revive_after: Option<Duration>,
    ) -> Result<Self, AddressError> {
        let backends = configs
            .iter()
            .map(Backend::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(backends, revive_after))
    }

    /// Pick the next live backend, or `None` when every backend is dead.
    pub fn select_next(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        if len == 0 {
            return None;
        }

        let mut cursor = self.cursor.lock().expect("backend pool mutex poisoned");
        for i in 0..len {
            let index = (*cursor + i) % len;
            let backend = &self.backends[index];
            if backend.is_alive() || self.try_revive(backend) {
                *cursor = (index + 1) % len;
                return Some(backend.clone());
            }
        }
        None
    }

    fn try_revive(&self, backend: &Backend) -> bool {
        let (Some(cooldown), Some(dead_for)) = (self.revive_after, backend.dead_for()) else {
            return false;
        };
        if dead_for < cooldown {
            return false;
        }
        if backend.mark_alive() {
            tracing::info!(
                backend = %backend.name(),
                address = %backend.authority(),
                dead_for = ?dead_for,
                "Backend re-admitted after cooldown"
            );
            metrics::record_backend_liveness(backend.authority(), true);
        }
        true
    }

    /// Mark the named backend alive. Returns `None` if no such backend exists.
    pub fn mark_alive(&self, name: &str) -> Option<bool> {
        let backend = self.find(name)?;
        let changed = backend.mark_alive();
        if changed {
            tracing::info!(backend = %name, address = %backend.authority(), "Backend marked alive");
            metrics::record_backend_liveness(backend.authority(), true);
        }
        Some(changed)
    }

    /// Mark the named backend dead. Returns `None` if no such backend exists.
    pub fn mark_dead(&self, name: &str) -> Option<bool> {
        let backend = self.find(name)?;
        let changed = backend.mark_dead();
        if changed {
            tracing::warn!(backend = %name, address = %backend.authority(), "Backend marked dead");
            metrics::record_backend_liveness(backend.authority(), false);
        }
        Some(changed)
    }

    /// Look a backend up by name, falling back to its address.
    pub fn find(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .or_else(|| self.backends.iter().find(|b| b.authority() == name))
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
