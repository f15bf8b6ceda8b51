//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend addresses are usable and unique
//! - Validate value ranges (limits > 0, ratio within bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::GatewayConfig;
use crate::load_balancer::Backend;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Upper bound for every duration field, in seconds (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

fn check_duration_bound(errors: &mut Vec<ValidationError>, field: &str, secs: u64) {
    if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::new(
            field,
            format!("must not exceed {} seconds", MAX_DURATION_SECS),
        ));
    }
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
    }

    let mut names = HashSet::new();
    let mut authorities = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{}]", i);
        if backend.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate name '{}'", backend.name)));
        }

        match Backend::from_config(backend) {
            Ok(b) => {
                if !authorities.insert(b.authority().to_string()) {
                    errors.push(ValidationError::new(
                        &field,
                        format!("duplicate address '{}'", b.authority()),
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(&field, e.to_string())),
        }
    }

    if config.pool.revive_after_secs == Some(0) {
        errors.push(ValidationError::new("pool.revive_after_secs", "must be greater than 0 when set"));
    }
    if let Some(secs) = config.pool.revive_after_secs {
        check_duration_bound(&mut errors, "pool.revive_after_secs", secs);
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        if rl.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
        if rl.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
        }
        check_duration_bound(&mut errors, "rate_limit.window_secs", rl.window_secs);
    }

    let cb = &config.circuit_breaker;
    if cb.name.is_empty() {
        errors.push(ValidationError::new("circuit_breaker.name", "must not be empty"));
    }
    if cb.max_requests == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_requests", "must be greater than 0"));
    }
    if cb.min_requests == 0 {
        errors.push(ValidationError::new("circuit_breaker.min_requests", "must be greater than 0"));
    }
    if cb.open_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.open_timeout_secs", "must be greater than 0"));
    }
    check_duration_bound(&mut errors, "circuit_breaker.open_timeout_secs", cb.open_timeout_secs);
    check_duration_bound(&mut errors, "circuit_breaker.interval_secs", cb.interval_secs);
    if !(cb.failure_ratio > 0.0 && cb.failure_ratio <= 1.0) {
        errors.push(ValidationError::new("circuit_breaker.failure_ratio", "must be in (0, 1]"));
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    }
    check_duration_bound(&mut errors, "timeouts.upstream_secs", config.timeouts.upstream_secs);

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when the admin API is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn backend(name: &str, address: &str) -> BackendConfig {
        BackendConfig {
            name: name.into(),
            address: address.into(),
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = GatewayConfig::default();
        config.backends.push(backend("a", "http://localhost:8081"));
        config.backends.push(backend("b", "localhost:8082"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.backends.push(backend("a", "http://localhost:8081"));
        config.backends.push(backend("a", "localhost:8081"));
        config.backends.push(backend("c", "https://secure:443"));
        config.circuit_breaker.failure_ratio = 1.5;
        config.timeouts.upstream_secs = 0;
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "backends[1]",
                "backends[1]",
                "backends[2]",
                "circuit_breaker.failure_ratio",
                "timeouts.upstream_secs",
                "admin.api_key",
            ]
        );
    }

    #[test]
    fn test_empty_backends() {
        let errors = validate_config(&GatewayConfig::default()).unwrap_err();
        assert_eq!(errors[0].field, "backends");
    }

    #[test]
    fn test_rate_limit_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.backends.push(backend("a", "localhost:8081"));
        config.rate_limit.max_requests = 0;
        assert!(validate_config(&config).is_err());

        config.rate_limit.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duration_upper_bounds() {
        let mut config = GatewayConfig::default();
        config.backends.push(backend("a", "localhost:8081"));
        config.circuit_breaker.open_timeout_secs = i64::MAX as u64;
        config.circuit_breaker.interval_secs = u64::MAX;
        config.rate_limit.window_secs = MAX_DURATION_SECS + 1;
        config.pool.revive_after_secs = Some(u64::MAX);
        config.timeouts.upstream_secs = u64::MAX;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "pool.revive_after_secs",
                "rate_limit.window_secs",
                "circuit_breaker.open_timeout_secs",
                "circuit_breaker.interval_secs",
                "timeouts.upstream_secs",
            ]
        );

        config.circuit_breaker.open_timeout_secs = MAX_DURATION_SECS;
        config.circuit_breaker.interval_secs = 0;
        config.rate_limit.window_secs = MAX_DURATION_SECS;
        config.pool.revive_after_secs = Some(30);
        config.timeouts.upstream_secs = 3;
        assert!(validate_config(&config).is_ok());
    }
}
