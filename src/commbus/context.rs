//! Dispatch context — the "who/what/cancellation" triple threaded through a
//! single `publish`/`send`/`query` call, distinct from the caller's own
//! cancellation token.
//!
//! The source this crate generalizes from used a placeholder correlation id
//! (a constant `0`) to key per-dispatch scratch state, which collided across
//! concurrent calls. Giving every dispatch a real [`DispatchId`] and deriving
//! a dedicated cancellation token removes the collision and gives
//! middleware something real to key off.

use crate::commbus::message::Category;
use crate::types::DispatchId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context passed to every handler and middleware phase for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    dispatch_id: DispatchId,
    type_key: Arc<str>,
    category: Category,
    cancellation: CancellationToken,
}

impl DispatchContext {
    pub(crate) fn new(type_key: Arc<str>, category: Category, caller: &CancellationToken) -> Self {
        Self {
            dispatch_id: DispatchId::new(),
            type_key,
            category,
            cancellation: caller.child_token(),
        }
    }

    /// Identifier unique to this single dispatch.
    pub fn dispatch_id(&self) -> &DispatchId {
        &self.dispatch_id
    }

    /// The type key this dispatch was routed under.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// This dispatch's category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// True once the dispatch has been cancelled (caller cancellation, or a
    /// query timeout firing).
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the dispatch is cancelled. Handlers that want to unwind
    /// promptly on a query timeout should race this against their own work.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }
}
