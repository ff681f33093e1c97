//! Demo message catalog.
//!
//! A handful of example event/command/query types used by the integration
//! tests and doctests. `AgentStarted`/`SettingsChanged`/`GetSettings` are
//! ordinary self-describing messages — one Rust type, one fixed
//! [`Message::TYPE_KEY`]. [`CatalogMessage`] instead demonstrates the
//! catalog-based mechanism: one Rust type multiplexing several logical
//! kinds, resolving its key per-instance and falling back to
//! [`UNKNOWN_TYPE_KEY`] for anything it doesn't recognize.

use crate::commbus::message::{Category, Message, UNKNOWN_TYPE_KEY};
use std::borrow::Cow;
use std::collections::HashMap;

/// Fired when an agent begins a run. Self-describing: fixed type key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AgentStarted {
    pub name: String,
}

impl Message for AgentStarted {
    type Response = ();
    fn category() -> Category {
        Category::Event
    }
    const TYPE_KEY: &'static str = "AgentStarted";
}

/// Fire-and-forget request to change a setting. At most one handler.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangeSetting {
    pub key: String,
    pub value: String,
}

impl Message for ChangeSetting {
    type Response = ();
    fn category() -> Category {
        Category::Command
    }
    const TYPE_KEY: &'static str = "ChangeSetting";
}

/// Request/response lookup of a single setting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GetSettings {
    pub key: String,
}

/// Response payload for [`GetSettings`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SettingsValue {
    pub values: HashMap<String, String>,
}

impl Message for GetSettings {
    type Response = SettingsValue;
    fn category() -> Category {
        Category::Query
    }
    const TYPE_KEY: &'static str = "GetSettings";
}

/// Catalog-based descriptor: one Rust type standing in for a closed set of
/// wire-level event kinds, resolving its key by pattern match rather than by
/// a fixed per-type constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogMessage {
    AgentStarted { name: String },
    AgentStopped { name: String },
    Other(serde_json::Value),
}

impl Message for CatalogMessage {
    type Response = ();

    fn category() -> Category {
        Category::Event
    }

    // Registration still needs a single stable key; catalog messages are
    // typically only published, not subscribed to, by this static key — real
    // routing for catalog-based payloads happens on `instance_type_key`.
    const TYPE_KEY: &'static str = UNKNOWN_TYPE_KEY;

    fn instance_type_key(&self) -> Cow<'static, str> {
        match self {
            CatalogMessage::AgentStarted { .. } => Cow::Borrowed("AgentStarted"),
            CatalogMessage::AgentStopped { .. } => Cow::Borrowed("AgentStopped"),
            CatalogMessage::Other(_) => Cow::Borrowed(UNKNOWN_TYPE_KEY),
        }
    }
}
