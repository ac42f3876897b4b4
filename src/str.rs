//! Identifier string type.
//!
//! Campaign, node, experiment and segmentation ids flow from the parsed
//! configuration through evaluation, telemetry and the scheduler, getting
//! cloned at every hand-off. `Str` makes those clones O(1) and keeps the ids
//! usable as map keys looked up by plain `&str`.

use std::{borrow::Borrow, sync::Arc};

use serde::{Deserialize, Serialize};

/// A reference-counted immutable identifier string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Str(Arc<str>);

impl Str {
    /// View as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Str {
    fn from(value: &str) -> Str {
        Str(Arc::from(value))
    }
}

impl From<String> for Str {
    fn from(value: String) -> Str {
        Str(Arc::from(value))
    }
}

// Targeting-node tables and segment sets are keyed by `Str`; `Borrow` lets
// callers look entries up by `&str` without allocating a key.
impl Borrow<str> for Str {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Str {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl log::kv::ToValue for Str {
    fn to_value(&self) -> log::kv::Value {
        log::kv::Value::from_display(self)
    }
}
