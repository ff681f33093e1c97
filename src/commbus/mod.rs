//! In-process communication bus: events, commands, queries, a two-phase
//! middleware chain, and a per-type-key circuit breaker.
//!
//! See [`Bus`] for the dispatch entry points and [`Message`] for how a type
//! opts into routing.

mod bus;
mod circuit_breaker;
mod context;
mod handler;
mod logging;
mod message;
mod middleware;

pub mod catalog;

pub use bus::Bus;
pub use circuit_breaker::{CircuitBreakerMiddleware, CircuitState};
pub use context::DispatchContext;
pub use handler::{Handler, HandlerFn, SubscriptionId};
pub use logging::{Logger, LoggingMiddleware, TracingLogger};
pub use message::{downcast_message, Category, DynMessage, Message, UNKNOWN_TYPE_KEY};
pub use middleware::{run_after, run_after_observe, run_before, BeforeOutcome, BusValue, Middleware};
