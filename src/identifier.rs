//! Composite identifiers.
//!
//! A composite identifier is the only handle to a remote resource that
//! survives between operations: an ordered list of string components joined
//! by [`FIELD_SEPARATOR`].
//!
//! The separator is not escaped. A component containing `#` produces an
//! identifier that splits into the wrong number of parts, and that cannot be
//! fixed without changing the format of identifiers already persisted. `join`
//! logs a warning when it happens.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

/// The separator between identifier components.
pub const FIELD_SEPARATOR: &str = "#";

/// Join components into an identifier.
pub fn join<S: AsRef<str>>(components: &[S]) -> String {
    for (index, component) in components.iter().enumerate() {
        if component.as_ref().contains(FIELD_SEPARATOR) {
            warn!(
                component = component.as_ref(),
                index, "identifier component contains the separator '{}'", FIELD_SEPARATOR
            );
        }
    }
    components
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Split an identifier into exactly `expected` components.
pub fn split(id: &str, expected: usize) -> Result<Vec<String>, EngineError> {
    let parts: Vec<String> = id.split(FIELD_SEPARATOR).map(str::to_string).collect();
    if parts.len() != expected {
        return Err(EngineError::Identifier {
            id: id.to_string(),
            reason: "component count mismatch".to_string(),
        });
    }
    Ok(parts)
}

/// A persisted composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeId(String);

impl CompositeId {
    /// Build an identifier from its components.
    pub fn from_components<S: AsRef<str>>(components: &[S]) -> Self {
        Self(join(components))
    }

    /// Wrap an already-persisted identifier without checking it.
    pub fn from_persisted(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Decode into exactly `expected` components.
    pub fn components(&self, expected: usize) -> Result<Vec<String>, EngineError> {
        split(&self.0, expected)
    }

    /// The identifier as persisted.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the persisted string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CompositeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
