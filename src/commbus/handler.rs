//! Handler abstraction and the type-erased storage the bus keeps it behind.

use crate::commbus::context::DispatchContext;
use crate::commbus::message::{downcast_message, DynMessage, Message};
use crate::types::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A pure handler: given a dispatch context and a message, produce a result
/// or an error. Implemented once per concrete [`Message`] type.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, ctx: &DispatchContext, msg: Arc<M>) -> Result<M::Response>;
}

/// Adapts a plain async closure into a [`Handler`], so callers don't need to
/// define a zero-sized struct and an `impl` block for simple cases.
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<M, F, Fut> Handler<M> for HandlerFn<F>
where
    M: Message,
    F: Fn(DispatchContext, Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<M::Response>> + Send + 'static,
{
    async fn handle(&self, ctx: &DispatchContext, msg: Arc<M>) -> Result<M::Response> {
        (self.0)(ctx.clone(), msg).await
    }
}

/// Type-erased outcome of a handler invocation: the boxed response (if any)
/// and/or an error, mirroring the source's `(result, error)` pair.
pub type ErasedOutcome = (Option<Box<dyn Any + Send + Sync>>, Option<Error>);

/// Object-safe counterpart of [`Handler`] — what the bus's registration
/// tables actually store.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn call(&self, ctx: DispatchContext, msg: Arc<dyn DynMessage>) -> ErasedOutcome;
}

pub(crate) struct TypedHandler<M: Message, H: Handler<M>> {
    inner: H,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message, H: Handler<M>> TypedHandler<M, H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Message, H: Handler<M>> ErasedHandler for TypedHandler<M, H> {
    async fn call(&self, ctx: DispatchContext, msg: Arc<dyn DynMessage>) -> ErasedOutcome {
        let typed = match downcast_message::<M>(msg) {
            Some(typed) => typed,
            None => {
                return (
                    None,
                    Some(Error::internal(format!(
                        "registration/dispatch type mismatch for {}",
                        M::TYPE_KEY
                    ))),
                )
            }
        };
        match self.inner.handle(&ctx, typed).await {
            Ok(response) => (Some(Box::new(response) as Box<dyn Any + Send + Sync>), None),
            Err(err) => (None, Some(err)),
        }
    }
}

/// Opaque token returned by [`crate::commbus::Bus::subscribe`]; pass it to
/// `unsubscribe` to remove exactly that subscription. Idempotent: a second
/// `unsubscribe` with the same token is a no-op.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    pub(crate) type_key: Arc<str>,
    pub(crate) id: u64,
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({}#{})", self.type_key, self.id)
    }
}
