//! Core types for the communication bus.
//!
//! This module provides foundational types used throughout the crate:
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the bus, circuit breaker, and observability
//! - **Ids**: Strongly-typed identifiers (`DispatchId`)

mod config;
mod errors;
mod ids;

pub use config::{BusConfig, CircuitBreakerConfig, Config, ObservabilityConfig};
pub use errors::{BoxError, Error, Result};
pub use ids::DispatchId;
