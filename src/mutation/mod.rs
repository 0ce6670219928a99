//! Mutation records: the unit of change inside a step
//!
//! A `MutationRecord` is a closed sum over the four kinds of tree change the
//! engine knows about. Every record is self-contained (it names its targets
//! by oid and carries whatever content it needs) and has an exact algebraic
//! inverse:
//!
//! - `add`⁻¹ = `remove` of the same subtree
//! - `remove`⁻¹ = `add` of the captured subtree at its original anchor
//! - `text`⁻¹ = `text` with old and new values swapped
//! - `attribute`⁻¹ = `attribute` with old and new values swapped
//!
//! History is therefore a stack of invertible operations and a rebase is
//! just "pop, push, push back".

pub mod recorder;

pub use recorder::MutationRecorder;

use crate::tree::{Oid, SerializedNode};
use serde::{Deserialize, Serialize};

/// Where an inserted node goes among its new siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "at", content = "sibling", rename_all = "snake_case")]
pub enum Anchor {
    /// First child
    Start,
    /// Last child
    End,
    /// Immediately after the given sibling
    After(Oid),
    /// Immediately before the given sibling
    Before(Oid),
}

/// One change to the document tree
///
/// # Example
///
/// ```rust
/// use stepsync_core::mutation::MutationRecord;
/// use stepsync_core::tree::Oid;
///
/// let edit = MutationRecord::Text {
///     oid: Oid::new("t1"),
///     old_value: "ab".to_string(),
///     value: "abc".to_string(),
/// };
///
/// assert_eq!(edit.inverse().inverse(), edit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationRecord {
    /// Insert a serialized subtree under `parent` at `anchor`
    Add {
        parent: Oid,
        anchor: Anchor,
        node: SerializedNode,
    },

    /// Detach the subtree rooted at `oid`
    ///
    /// `parent`, `anchor` and `node` describe where and what it was, so the
    /// inverse can reinsert it verbatim.
    Remove {
        oid: Oid,
        parent: Oid,
        anchor: Anchor,
        node: SerializedNode,
    },

    /// Replace the value of a text node
    #[serde(rename_all = "camelCase")]
    Text {
        oid: Oid,
        old_value: String,
        value: String,
    },

    /// Set (`Some`) or remove (`None`) an element attribute
    #[serde(rename_all = "camelCase")]
    Attribute {
        oid: Oid,
        name: String,
        old_value: Option<String>,
        value: Option<String>,
    },
}

impl MutationRecord {
    /// The record that undoes this one
    pub fn inverse(&self) -> MutationRecord {
        match self {
            MutationRecord::Add {
                parent,
                anchor,
                node,
            } => MutationRecord::Remove {
                oid: node.oid.clone(),
                parent: parent.clone(),
                anchor: anchor.clone(),
                node: node.clone(),
            },
            MutationRecord::Remove {
                parent,
                anchor,
                node,
                ..
            } => MutationRecord::Add {
                parent: parent.clone(),
                anchor: anchor.clone(),
                node: node.clone(),
            },
            MutationRecord::Text {
                oid,
                old_value,
                value,
            } => MutationRecord::Text {
                oid: oid.clone(),
                old_value: value.clone(),
                value: old_value.clone(),
            },
            MutationRecord::Attribute {
                oid,
                name,
                old_value,
                value,
            } => MutationRecord::Attribute {
                oid: oid.clone(),
                name: name.clone(),
                old_value: value.clone(),
                value: old_value.clone(),
            },
        }
    }

    /// The node this record primarily acts on
    pub fn target(&self) -> &Oid {
        match self {
            MutationRecord::Add { node, .. } => &node.oid,
            MutationRecord::Remove { oid, .. }
            | MutationRecord::Text { oid, .. }
            | MutationRecord::Attribute { oid, .. } => oid,
        }
    }

    /// Wire name of the record kind
    pub fn kind(&self) -> &'static str {
        match self {
            MutationRecord::Add { .. } => "add",
            MutationRecord::Remove { .. } => "remove",
            MutationRecord::Text { .. } => "text",
            MutationRecord::Attribute { .. } => "attribute",
        }
    }
}

/// Inverses of a batch, in the order they must be applied to undo it
pub fn invert_all(records: &[MutationRecord]) -> Vec<MutationRecord> {
    records.iter().rev().map(MutationRecord::inverse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_add() -> MutationRecord {
        MutationRecord::Add {
            parent: Oid::root(),
            anchor: Anchor::After(Oid::new("t1")),
            node: SerializedNode::text(Oid::new("t2"), "dc"),
        }
    }

    #[test]
    fn test_add_inverse_is_remove() {
        let add = sample_add();
        match add.inverse() {
            MutationRecord::Remove { oid, parent, .. } => {
                assert_eq!(oid, Oid::new("t2"));
                assert!(parent.is_root());
            }
            other => panic!("unexpected inverse {:?}", other),
        }
        assert_eq!(add.inverse().inverse(), add);
    }

    #[test]
    fn test_attribute_inverse() {
        let set = MutationRecord::Attribute {
            oid: Oid::new("p"),
            name: "class".to_string(),
            old_value: None,
            value: Some("x".to_string()),
        };
        assert_eq!(
            set.inverse(),
            MutationRecord::Attribute {
                oid: Oid::new("p"),
                name: "class".to_string(),
                old_value: Some("x".to_string()),
                value: None,
            }
        );
    }

    #[test]
    fn test_invert_all_reverses_order() {
        let a = MutationRecord::Text {
            oid: Oid::new("t"),
            old_value: "a".to_string(),
            value: "ab".to_string(),
        };
        let b = sample_add();
        let inverted = invert_all(&[a.clone(), b.clone()]);
        assert_eq!(inverted, vec![b.inverse(), a.inverse()]);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(sample_add()).unwrap();
        assert_eq!(json["type"], "add");
        assert_eq!(json["parent"], "root");
        assert_eq!(json["anchor"], serde_json::json!({"at": "after", "sibling": "t1"}));
        assert_eq!(json["node"]["oid"], "t2");

        let text = MutationRecord::Text {
            oid: Oid::new("t"),
            old_value: "a".to_string(),
            value: "b".to_string(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "oid": "t", "oldValue": "a", "value": "b"}));
        let back: MutationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, text);
    }

    #[test]
    fn test_unit_anchor_shape() {
        let json = serde_json::to_value(Anchor::Start).unwrap();
        assert_eq!(json, serde_json::json!({"at": "start"}));
    }
}
