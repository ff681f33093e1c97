//! Message descriptor: the routing key and category every dispatched value
//! carries.

use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

/// The three dispatch patterns the bus supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Fan-out to zero or more subscribers. No result is returned.
    Event,
    /// At most one handler. No result is returned, only an error.
    Command,
    /// Exactly one handler, request/response, subject to the bus's query
    /// timeout.
    Query,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Event => "event",
            Category::Command => "command",
            Category::Query => "query",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel type key used when a message's concrete type cannot be resolved
/// by a catalog-based descriptor (see [`crate::commbus::catalog`]).
pub const UNKNOWN_TYPE_KEY: &str = "Unknown";

/// A value the bus can route: carries a stable type key and a category.
///
/// Two mechanisms satisfy this trait in practice:
/// - **Self-describing**: most message structs just set `TYPE_KEY` to a
///   fixed string and accept the default `instance_type_key`.
/// - **Catalog-based**: a single Rust type (typically an enum) multiplexes
///   several logical message kinds and resolves its key per-instance by
///   pattern match, falling back to [`UNKNOWN_TYPE_KEY`] for anything it
///   doesn't recognize. See [`crate::commbus::catalog::CatalogMessage`].
pub trait Message: Send + Sync + 'static {
    /// The value a handler produces for this message. Events and commands
    /// typically use `()`; queries carry the response payload.
    type Response: Send + Sync + 'static;

    /// This message's dispatch category.
    fn category() -> Category;

    /// The stable key used at *registration* time (`subscribe`,
    /// `register_handler`), before any message instance exists.
    const TYPE_KEY: &'static str;

    /// The key used at *dispatch* time for a specific value. Defaults to
    /// `Self::TYPE_KEY`; override for catalog-based multiplexing.
    fn instance_type_key(&self) -> Cow<'static, str> {
        Cow::Borrowed(Self::TYPE_KEY)
    }
}

/// Object-safe counterpart of [`Message`], used internally so the bus can
/// hold heterogeneous message values behind one registration table.
///
/// Implemented automatically for every `M: Message` — callers never
/// implement this directly.
pub trait DynMessage: Send + Sync + 'static {
    fn dyn_type_key(&self) -> Cow<'static, str>;
    fn dyn_category(&self) -> Category;
    fn as_any(&self) -> &dyn Any;

    /// Recover the concrete `Arc<M>` this value was built from.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> DynMessage for M {
    fn dyn_type_key(&self) -> Cow<'static, str> {
        self.instance_type_key()
    }

    fn dyn_category(&self) -> Category {
        M::category()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Downcast an erased dispatch message back to its concrete type.
///
/// Returns `None` only if the registration table and the message's dynamic
/// type have drifted apart, which would be an internal bug — callers in
/// this crate treat that as [`crate::types::Error::internal`].
pub fn downcast_message<M: Message>(msg: Arc<dyn DynMessage>) -> Option<Arc<M>> {
    msg.into_any_arc().downcast::<M>().ok()
}
