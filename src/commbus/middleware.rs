//! Two-phase middleware chain: ordered `before`, reverse-ordered `after`.

use crate::commbus::context::DispatchContext;
use crate::commbus::message::DynMessage;
use crate::types::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Type-erased handler/middleware result payload.
pub type BusValue = Box<dyn Any + Send + Sync>;

/// A two-phase dispatch interceptor.
///
/// `before` runs in registration order and may replace the message, abort
/// the dispatch (`Ok(None)`), or short-circuit with an error (`Err`).
///
/// `after` runs once per dispatch in the exact reverse order. It is handed
/// the *accumulated* result/error so far (by reference, so it can inspect
/// them for logging without taking ownership) and returns its own opinion:
/// `Some(_)` replaces the accumulated value, `None` means "no change, keep
/// what's there" — a later (more "outer") middleware's non-`None` error
/// always wins over an earlier one's, and a `None` result never erases a
/// prior non-`None` result.
///
/// Default implementations pass the message through unchanged in `before`
/// and have no opinion in `after`, so a middleware that only cares about one
/// phase need only override that one.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn before(
        &self,
        _ctx: &DispatchContext,
        msg: Arc<dyn DynMessage>,
    ) -> Result<Option<Arc<dyn DynMessage>>> {
        Ok(Some(msg))
    }

    async fn after(
        &self,
        _ctx: &DispatchContext,
        _original: &Arc<dyn DynMessage>,
        _result: Option<&BusValue>,
        _error: Option<&Error>,
    ) -> (Option<BusValue>, Option<Error>) {
        (None, None)
    }
}

/// Outcome of the before-phase: either the (possibly rewritten) message to
/// hand the handler, or a silent abort.
pub enum BeforeOutcome {
    Continue(Arc<dyn DynMessage>),
    Aborted,
}

/// Run the before-phase over a registration-order snapshot.
pub async fn run_before(
    chain: &[Arc<dyn Middleware>],
    ctx: &DispatchContext,
    msg: Arc<dyn DynMessage>,
) -> Result<BeforeOutcome> {
    let mut current = msg;
    for mw in chain {
        match mw.before(ctx, current).await? {
            Some(next) => current = next,
            None => return Ok(BeforeOutcome::Aborted),
        }
    }
    Ok(BeforeOutcome::Continue(current))
}

/// Run the after-phase over the same snapshot, in reverse order.
pub async fn run_after(
    chain: &[Arc<dyn Middleware>],
    ctx: &DispatchContext,
    original: &Arc<dyn DynMessage>,
    mut result: Option<BusValue>,
    mut error: Option<Error>,
) -> (Option<BusValue>, Option<Error>) {
    for mw in chain.iter().rev() {
        let (r, e) = mw.after(ctx, original, result.as_ref(), error.as_ref()).await;
        if let Some(e) = e {
            error = Some(e);
        }
        if let Some(r) = r {
            result = Some(r);
        }
    }
    (result, error)
}

/// Run the after-phase purely for its side effects (logging, breaker state),
/// discarding whatever the chain returns.
///
/// `send` needs this: unlike `query`, its contract gives `after` no
/// precedence over the handler's own error, so the accumulated output of
/// [`run_after`] isn't useful there, only the act of running it is.
pub async fn run_after_observe(
    chain: &[Arc<dyn Middleware>],
    ctx: &DispatchContext,
    original: &Arc<dyn DynMessage>,
    result: Option<&BusValue>,
    error: Option<&Error>,
) {
    for mw in chain.iter().rev() {
        mw.after(ctx, original, result, error).await;
    }
}
