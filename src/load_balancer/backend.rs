//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream instance (name + network address)
//! - Hold the liveness flag behind its own reader/writer lock
//! - Remember when the backend was marked dead (for optional cooldown)
//!
//! # Design Decisions
//! - Liveness reads take the shared lock; mark-alive/mark-dead take the
//!   exclusive lock. Reads are far more frequent than writes.
//! - Marking is idempotent; callers learn whether the flag actually flipped
//!   so that transitions are logged once.

use std::str::FromStr;
use std::sync::RwLock;

use axum::http::uri::Authority;
use tokio::time::Instant;
use url::Url;

use crate::config::BackendConfig;

/// Error returned when a configured backend address cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid backend address '{address}': {source}")]
    Parse {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("backend address '{0}' must use the http scheme")]
    Scheme(String),
    #[error("backend address '{0}' has no host")]
    MissingHost(String),
    #[error("backend address '{0}' is not a valid authority")]
    Authority(String),
}

#[derive(Debug)]
struct Liveness {
    alive: bool,
    dead_since: Option<Instant>,
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    name: String,
    /// `host:port` used as the outbound authority.
    authority: Authority,
    liveness: RwLock<Liveness>,
}

impl Backend {
    /// Create a live backend from an address such as `http://localhost:8081`
    /// or `127.0.0.1:8081`.
    pub fn new(name: impl Into<String>, address: &str) -> Result<Self, AddressError> {
        let url = parse_address(address)?;
        let host = url
            .host_str()
            .ok_or_else(|| AddressError::MissingHost(address.to_string()))?;
        let authority = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority)
            .map_err(|_| AddressError::Authority(address.to_string()))?;

        Ok(Self {
            name: name.into(),
            authority,
            liveness: RwLock::new(Liveness {
                alive: true,
                dead_since: None,
            }),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, AddressError> {
        Self::new(config.name.clone(), &config.address)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `host:port` requests are forwarded to.
    pub fn authority(&self) -> &str {
        self.authority.as_str()
    }

    pub fn uri_authority(&self) -> &Authority {
        &self.authority
    }

    pub fn is_alive(&self) -> bool {
        self.liveness
            .read()
            .expect("backend liveness lock poisoned")
            .alive
    }

    /// Mark the backend alive. Returns true if it was dead before.
    pub fn mark_alive(&self) -> bool {
        let mut liveness = self
            .liveness
            .write()
            .expect("backend liveness lock poisoned");
        let revived = !liveness.alive;
        liveness.alive = true;
        liveness.dead_since = None;
        revived
    }

    /// Mark the backend dead. Returns true if it was alive before.
    pub fn mark_dead(&self) -> bool {
        let mut liveness = self
            .liveness
            .write()
            .expect("backend liveness lock poisoned");
        if !liveness.alive {
            return false;
        }
        liveness.alive = false;
        liveness.dead_since = Some(Instant::now());
        true
    }

    /// How long the backend has been dead, or `None` while alive.
    pub fn dead_for(&self) -> Option<std::time::Duration> {
        self.liveness
            .read()
            .expect("backend liveness lock poisoned")
            .dead_since
            .map(|since| since.elapsed())
    }
}

fn parse_address(address: &str) -> Result<Url, AddressError> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|source| AddressError::Parse {
        address: address.to_string(),
        source,
    })?;

    if url.scheme() != "http" {
        return Err(AddressError::Scheme(address.to_string()));
    }
    Ok(url)
}
