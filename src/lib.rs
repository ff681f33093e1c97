//! # commbus-core
//!
//! An in-process communication bus for coordinating events, commands, and
//! queries between components that would otherwise need direct references to
//! each other.
//!
//! - **Events** (`publish`) fan out to zero or more subscribers concurrently.
//! - **Commands** (`send`) go to at most one handler; no response, just
//!   success or failure.
//! - **Queries** (`query`) go to exactly one handler and return a typed
//!   response, subject to a timeout.
//!
//! Every dispatch runs through a two-phase middleware chain
//! ([`commbus::Middleware`]) — `before` in registration order, `after` in
//! reverse — and a per-type-key [`commbus::CircuitBreakerMiddleware`] can be
//! installed like any other middleware to stop dispatching to a type that is
//! failing repeatedly.
//!
//! See [`commbus::Bus`] for the entry points.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod commbus;
pub mod types;

mod recovery;

pub mod observability;

pub use types::{Config, Error, Result};
