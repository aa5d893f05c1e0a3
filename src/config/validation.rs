//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, addresses parse)
//! - Detect duplicate service names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),
    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,
    #[error("listener.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,
    #[error("shutdown.grace_period_secs must be greater than zero")]
    ZeroGracePeriod,
    #[error("shutdown.signals must name at least one signal")]
    NoSignals,
    #[error("health.service_names must not contain empty names")]
    EmptyServiceName,
    #[error("health.service_names lists `{0}` more than once")]
    DuplicateServiceName(String),
    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    }
    if config.shutdown.signals.is_empty() {
        errors.push(ValidationError::NoSignals);
    }

    let mut seen = HashSet::new();
    for name in &config.health.service_names {
        if name.is_empty() {
            errors.push(ValidationError::EmptyServiceName);
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateServiceName(name.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
