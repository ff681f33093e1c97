//! Strongly-typed identifiers.
//!
//! `DispatchId` tags a single `publish`/`send`/`query` call so middleware can
//! correlate its `before` and `after` observations without a shared mutable
//! placeholder keyed off e.g. a pointer address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a single dispatch (one `publish`/`send`/`query` call).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(String);

impl DispatchId {
    /// Mint a new, process-unique dispatch id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_ids_are_unique() {
        assert_ne!(DispatchId::new(), DispatchId::new());
    }
}
