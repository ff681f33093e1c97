//! The bus core: registration tables, dispatch for the three message
//! patterns, middleware chain running, query timeout, introspection.

use crate::commbus::context::DispatchContext;
use crate::commbus::handler::{ErasedHandler, Handler, SubscriptionId, TypedHandler};
use crate::commbus::message::{Category, DynMessage, Message};
use crate::commbus::middleware::{run_after, run_after_observe, run_before, BeforeOutcome, Middleware};
use crate::recovery::with_recovery_async;
use crate::types::{BusConfig, Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Tables {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
    subscribers: HashMap<String, Vec<(u64, Arc<dyn ErasedHandler>)>>,
    middleware: Vec<Arc<dyn Middleware>>,
    next_subscription_id: u64,
}

/// The in-process communication bus.
///
/// Cheap to clone: internally an `Arc`-free struct behind a single
/// `RwLock<Tables>`, meant to be constructed once and shared by reference
/// (or wrapped in an `Arc` by the embedding application) for the life of the
/// process.
pub struct Bus {
    tables: RwLock<Tables>,
    default_query_timeout: Duration,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("default_query_timeout", &self.default_query_timeout)
            .finish_non_exhaustive()
    }
}

impl Bus {
    /// Construct a bus with the given default query timeout and empty
    /// registration tables.
    pub fn new(default_query_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            default_query_timeout,
        }
    }

    /// Construct a bus from a [`BusConfig`].
    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.default_query_timeout)
    }

    /// Subscribe a handler to an event type. Many subscribers may share a
    /// type key; duplicate registrations of the same handler deliver twice.
    pub async fn subscribe<M, H>(&self, handler: H) -> SubscriptionId
    where
        M: Message,
        H: Handler<M>,
    {
        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler::new(handler));
        let mut tables = self.tables.write().await;
        let id = tables.next_subscription_id;
        tables.next_subscription_id += 1;
        tables
            .subscribers
            .entry(M::TYPE_KEY.to_string())
            .or_default()
            .push((id, erased));
        SubscriptionId {
            type_key: Arc::from(M::TYPE_KEY),
            id,
        }
    }

    /// Remove exactly the subscription identified by `token`. Idempotent: a
    /// second call with the same token is a no-op.
    pub async fn unsubscribe(&self, token: SubscriptionId) {
        let mut tables = self.tables.write().await;
        if let Some(list) = tables.subscribers.get_mut(token.type_key.as_ref()) {
            list.retain(|(id, _)| *id != token.id);
        }
    }

    /// Register the single handler for a command/query type. Fails with
    /// [`Error::HandlerAlreadyRegistered`] if one is already present; the
    /// existing handler is left untouched.
    pub async fn register_handler<M, H>(&self, handler: H) -> Result<()>
    where
        M: Message,
        H: Handler<M>,
    {
        let mut tables = self.tables.write().await;
        if tables.handlers.contains_key(M::TYPE_KEY) {
            return Err(Error::handler_already_registered(M::TYPE_KEY));
        }
        tables
            .handlers
            .insert(M::TYPE_KEY.to_string(), Arc::new(TypedHandler::new(handler)));
        Ok(())
    }

    /// Append a middleware owned solely by the bus.
    pub async fn add_middleware<M: Middleware>(&self, middleware: M) {
        self.add_middleware_arc(Arc::new(middleware)).await;
    }

    /// Append a middleware the caller retains a handle to (e.g. a circuit
    /// breaker whose `get_states()`/`reset()` the caller still wants to
    /// call directly).
    pub async fn add_middleware_arc(&self, middleware: Arc<dyn Middleware>) {
        let mut tables = self.tables.write().await;
        tables.middleware.push(middleware);
    }

    pub async fn has_handler(&self, type_key: &str) -> bool {
        self.tables.read().await.handlers.contains_key(type_key)
    }

    /// Copy of the subscriptions currently registered for `type_key`.
    pub async fn get_subscribers(&self, type_key: &str) -> Vec<SubscriptionId> {
        let tables = self.tables.read().await;
        match tables.subscribers.get(type_key) {
            Some(list) => list
                .iter()
                .map(|(id, _)| SubscriptionId {
                    type_key: Arc::from(type_key),
                    id: *id,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Union of every type key with a registered handler or subscriber.
    pub async fn get_registered_types(&self) -> HashSet<String> {
        let tables = self.tables.read().await;
        tables
            .handlers
            .keys()
            .cloned()
            .chain(tables.subscribers.keys().cloned())
            .collect()
    }

    /// Atomically remove every handler, subscriber, and middleware.
    /// In-flight dispatches that already took their snapshot are unaffected.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.handlers.clear();
        tables.subscribers.clear();
        tables.middleware.clear();
    }

    async fn middleware_snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.tables.read().await.middleware.clone()
    }

    /// Fan out an event to every current subscriber concurrently. Always
    /// returns `Ok(())` — subscriber failures are logged and surfaced only
    /// to `after` middleware, never to the publisher.
    pub async fn publish<M: Message>(&self, caller_ctx: CancellationToken, msg: M) -> Result<()> {
        let type_key: Arc<str> = Arc::from(msg.instance_type_key().into_owned());
        let ctx = DispatchContext::new(type_key.clone(), Category::Event, &caller_ctx);
        let msg_arc: Arc<dyn DynMessage> = Arc::new(msg);

        let before_middleware = self.middleware_snapshot().await;
        let processed = match run_before(&before_middleware, &ctx, msg_arc.clone()).await? {
            BeforeOutcome::Aborted => {
                tracing::debug!(type_key = %type_key, "publish aborted by middleware");
                let after_middleware = self.middleware_snapshot().await;
                run_after(&after_middleware, &ctx, &msg_arc, None, None).await;
                return Ok(());
            }
            BeforeOutcome::Continue(m) => m,
        };

        let subscribers = {
            let tables = self.tables.read().await;
            tables
                .subscribers
                .get(type_key.as_ref())
                .cloned()
                .unwrap_or_default()
        };

        if subscribers.is_empty() {
            tracing::debug!(type_key = %type_key, "publish: no subscribers");
            let after_middleware = self.middleware_snapshot().await;
            run_after(&after_middleware, &ctx, &msg_arc, None, None).await;
            return Ok(());
        }

        let mut tasks = Vec::with_capacity(subscribers.len());
        for (_, handler) in subscribers {
            let handler_ctx = ctx.clone();
            let processed = processed.clone();
            tasks.push(tokio::spawn(async move {
                with_recovery_async("event_subscriber", handler.call(handler_ctx, processed))
                    .await
                    .unwrap_or_else(|panic_err| (None, Some(panic_err)))
            }));
        }

        // First error in subscriber order, not completion order.
        let mut representative_error = None;
        for task in tasks {
            let (_, err) = task.await.unwrap_or_else(|join_err| {
                (None, Some(Error::internal(format!("subscriber task: {join_err}"))))
            });
            if representative_error.is_none() {
                representative_error = err;
            } else if let Some(err) = err {
                tracing::warn!(type_key = %type_key, error = %err, "publish: additional subscriber failure");
            }
        }

        let after_middleware = self.middleware_snapshot().await;
        run_after(&after_middleware, &ctx, &msg_arc, None, representative_error).await;
        Ok(())
    }

    /// At-most-one handler invocation. Returns `Ok(())` when no handler is
    /// registered; returns the handler's (or a `before`/`after` middleware's)
    /// error otherwise.
    pub async fn send<M: Message>(&self, caller_ctx: CancellationToken, msg: M) -> Result<()> {
        let type_key: Arc<str> = Arc::from(msg.instance_type_key().into_owned());
        let ctx = DispatchContext::new(type_key.clone(), Category::Command, &caller_ctx);
        let msg_arc: Arc<dyn DynMessage> = Arc::new(msg);

        let before_middleware = self.middleware_snapshot().await;
        let processed = match run_before(&before_middleware, &ctx, msg_arc.clone()).await? {
            BeforeOutcome::Aborted => {
                tracing::debug!(type_key = %type_key, "send aborted by middleware");
                return Ok(());
            }
            BeforeOutcome::Continue(m) => m,
        };

        let handler = {
            let tables = self.tables.read().await;
            tables.handlers.get(type_key.as_ref()).cloned()
        };

        let Some(handler) = handler else {
            tracing::debug!(type_key = %type_key, "send: no handler registered");
            let after_middleware = self.middleware_snapshot().await;
            run_after_observe(&after_middleware, &ctx, &msg_arc, None, None).await;
            return Ok(());
        };

        let (_, handler_err) = with_recovery_async("command_handler", handler.call(ctx.clone(), processed))
            .await
            .unwrap_or_else(|panic_err| (None, Some(panic_err)));

        // Unlike `query`, `after` has no precedence rule here: `send` always
        // surfaces the handler's own error (or success), even if `after`
        // additionally records an error of its own.
        let after_middleware = self.middleware_snapshot().await;
        run_after_observe(&after_middleware, &ctx, &msg_arc, None, handler_err.as_ref()).await;
        match handler_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Request/response with a timeout. See [`Error`] for the taxonomy of
    /// what this can return.
    pub async fn query<M: Message>(&self, caller_ctx: CancellationToken, msg: M) -> Result<M::Response> {
        let type_key: Arc<str> = Arc::from(msg.instance_type_key().into_owned());
        let ctx = DispatchContext::new(type_key.clone(), Category::Query, &caller_ctx);
        let msg_arc: Arc<dyn DynMessage> = Arc::new(msg);

        let before_middleware = self.middleware_snapshot().await;
        let processed = match run_before(&before_middleware, &ctx, msg_arc.clone()).await? {
            BeforeOutcome::Aborted => return Err(Error::no_handler(type_key.to_string())),
            BeforeOutcome::Continue(m) => m,
        };

        let handler = {
            let tables = self.tables.read().await;
            tables.handlers.get(type_key.as_ref()).cloned()
        };
        let Some(handler) = handler else {
            return Err(Error::no_handler(type_key.to_string()));
        };

        // Buffered capacity-1: if the timeout branch below fires first, the
        // handler task's eventual `tx.send` must not block or panic.
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task_ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = with_recovery_async("query_handler", handler.call(task_ctx, processed))
                .await
                .unwrap_or_else(|panic_err| (None, Some(panic_err)));
            let _ = tx.send(outcome);
        });

        tokio::select! {
            recv = rx => {
                let (result, handler_err) = recv.unwrap_or_else(|_| {
                    (None, Some(Error::internal("query handler task dropped without a result")))
                });
                let after_middleware = self.middleware_snapshot().await;
                let (final_result, final_err) = run_after(&after_middleware, &ctx, &msg_arc, result, handler_err).await;
                match final_err {
                    Some(err) => Err(err),
                    None => {
                        let boxed = final_result
                            .ok_or_else(|| Error::internal("handler returned neither a result nor an error"))?;
                        let typed = boxed
                            .downcast::<M::Response>()
                            .map_err(|_| Error::internal("query response type mismatch"))?;
                        Ok(*typed)
                    }
                }
            }
            _ = tokio::time::sleep(self.default_query_timeout) => {
                ctx.cancel();
                let timeout_secs = self.default_query_timeout.as_secs_f64();
                let timeout_err = Error::query_timeout(type_key.to_string(), timeout_secs);
                // Unlike the handler-completion branch above, a timeout is
                // unconditionally fatal to the call: `after` may observe it
                // (for logging/breaker bookkeeping) but cannot override it.
                let after_middleware = self.middleware_snapshot().await;
                run_after_observe(&after_middleware, &ctx, &msg_arc, None, Some(&timeout_err)).await;
                Err(timeout_err)
            }
        }
    }
}
