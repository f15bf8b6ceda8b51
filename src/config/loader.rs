//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterStoreKind;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
            [[backends]]
            name = "api-1"
            address = "http://localhost:8081"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.circuit_breaker.min_requests, 5);
        assert_eq!(config.circuit_breaker.max_requests, 3);
        assert_eq!(config.timeouts.upstream_secs, 3);
        assert_eq!(config.counter_store.kind, CounterStoreKind::Redis);
        assert!(config.pool.revive_after_secs.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[backends]]
            name = "a"
            address = "127.0.0.1:8081"

            [[backends]]
            name = "b"
            address = "127.0.0.1:8082"

            [pool]
            revive_after_secs = 30

            [rate_limit]
            max_requests = 10
            window_secs = 5

            [counter_store]
            kind = "memory"

            [circuit_breaker]
            name = "users"
            failure_ratio = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.pool.revive_after_secs, Some(30));
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.key_prefix, "rate_limit:");
        assert_eq!(config.counter_store.kind, CounterStoreKind::Memory);
        assert_eq!(config.circuit_breaker.name, "users");
        assert_eq!(config.circuit_breaker.open_timeout_secs, 10);
    }

    #[test]
    fn test_example_file_parses() {
        let config = parse_config(include_str!("../../gateway.example.toml")).unwrap();
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.backends[2].name, "api-3");
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_validation_error_surfaces() {
        let err = parse_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("at least one backend"));
    }

    #[test]
    fn test_rejects_unrepresentable_open_timeout() {
        let err = parse_config(
            r#"
            [[backends]]
            name = "a"
            address = "127.0.0.1:8081"

            [circuit_breaker]
            open_timeout_secs = 9223372036854775807
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("circuit_breaker.open_timeout_secs"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("backends = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
