//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Boxed opaque error returned by handlers and middleware, so callers that
/// want to downcast to their own concrete error type still can.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the communication bus.
#[derive(Error, Debug)]
pub enum Error {
    /// No handler is registered for this type key (`query`, or a `query`
    /// aborted by middleware before a handler ran).
    #[error("no handler registered for {0}")]
    NoHandler(String),

    /// A handler was already registered for this type key.
    #[error("handler already registered for {0}")]
    HandlerAlreadyRegistered(String),

    /// A query's handler did not complete before the bus's query timeout.
    #[error("query {0} timed out after {1:.2}s")]
    QueryTimeout(String, f64),

    /// Opaque error returned by a handler.
    #[error("handler error: {0}")]
    Handler(#[source] BoxError),

    /// Opaque error returned by a middleware.
    #[error("middleware error: {0}")]
    Middleware(#[source] BoxError),

    /// Internal invariant violation (e.g. a query response of the wrong type).
    #[error("internal error: {0}")]
    Internal(String),
}

// Convenience constructors
impl Error {
    pub fn no_handler(type_key: impl Into<String>) -> Self {
        Self::NoHandler(type_key.into())
    }

    pub fn handler_already_registered(type_key: impl Into<String>) -> Self {
        Self::HandlerAlreadyRegistered(type_key.into())
    }

    pub fn query_timeout(type_key: impl Into<String>, timeout_secs: f64) -> Self {
        Self::QueryTimeout(type_key.into(), timeout_secs)
    }

    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    pub fn middleware(err: impl Into<BoxError>) -> Self {
        Self::Middleware(err.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_handler_message_contains_type_key() {
        let err = Error::no_handler("GetSettings");
        assert_eq!(err.to_string(), "no handler registered for GetSettings");
    }

    #[test]
    fn query_timeout_message_formats_seconds() {
        let err = Error::query_timeout("GetSettings", 0.1);
        assert_eq!(err.to_string(), "query GetSettings timed out after 0.10s");
    }

    #[test]
    fn handler_error_wraps_source() {
        let source: BoxError = "boom".into();
        let err = Error::handler(source);
        assert_eq!(err.to_string(), "handler error: boom");
    }
}
