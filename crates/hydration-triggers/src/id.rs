//! Boundary identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied identifier of a hydration boundary.
///
/// Unique among the live boundaries of one scheduler. Looks up by `&str`
/// through [`Borrow`], so maps keyed by `BoundaryId` accept plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(String);

impl BoundaryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BoundaryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BoundaryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BoundaryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BoundaryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What a trigger source observes: the boundary plus the anchor element
/// its listeners or observers attach to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerTarget {
    pub boundary: BoundaryId,
    /// Platform-level handle of the anchor (for example a `data-*` marker
    /// or selector). Defaults to the boundary id.
    pub anchor: String,
}

impl TriggerTarget {
    pub fn new(boundary: BoundaryId, anchor: impl Into<String>) -> Self {
        Self {
            boundary,
            anchor: anchor.into(),
        }
    }

    /// Target whose anchor is the boundary id itself.
    pub fn for_boundary(boundary: BoundaryId) -> Self {
        let anchor = boundary.as_str().to_string();
        Self { boundary, anchor }
    }
}
