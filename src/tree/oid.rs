//! Oid: stable object identifier for document nodes
//!
//! Every node in the shared tree carries an oid assigned once, at creation,
//! by the participant that created it. Oids never change when a node moves
//! and are never reused, which is what lets mutation records and selections
//! address nodes across participants without positional indices.

use serde::{Deserialize, Serialize};

/// Oid of the document root. Identical on every participant.
pub const ROOT_OID: &str = "root";

/// Opaque, globally-unique node identifier
///
/// Oids are strings so they serialize verbatim into step and snapshot JSON.
/// The derived `Ord` is plain lexicographic order; the engine only uses it
/// for deterministic iteration, never for document order.
///
/// # Example
///
/// ```rust
/// use stepsync_core::tree::Oid;
///
/// let root = Oid::root();
/// assert!(root.is_root());
/// assert_eq!(Oid::new("c1.ab12.3").as_str(), "c1.ab12.3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    /// Wrap an existing identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The oid of the document root
    pub fn root() -> Self {
        Self(ROOT_OID.to_string())
    }

    /// Whether this is the document root
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_OID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Oid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        assert!(Oid::root().is_root());
        assert!(!Oid::new("c1.0").is_root());
    }

    #[test]
    fn test_serialization_is_transparent() {
        let oid = Oid::new("c1.ab.7");
        let json = serde_json::to_string(&oid).unwrap();
        assert_eq!(json, "\"c1.ab.7\"");

        let back: Oid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, oid);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Oid::new("x")), "x");
    }
}
