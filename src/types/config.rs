//! Configuration structures.
//!
//! Configuration is loaded from environment variables and config files by the
//! embedding application; this crate only defines the shape.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Global bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Bus core configuration (query timeout).
    #[serde(default)]
    pub bus: BusConfig,

    /// Circuit breaker middleware configuration.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Bus core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Default query timeout, applied to every `query` dispatch.
    #[serde(with = "humantime_serde")]
    pub default_query_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_query_timeout: Duration::from_secs(5),
        }
    }
}

/// Circuit breaker middleware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit. `0` disables the breaker
    /// (circuits never open).
    pub failure_threshold: u32,

    /// How long a circuit stays `open` before a probe is allowed through as `half-open`.
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,

    /// Type keys that bypass the breaker entirely; no state is ever created for them.
    #[serde(default)]
    pub excluded_types: HashSet<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            excluded_types: HashSet::new(),
        }
    }
}
