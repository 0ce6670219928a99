//! Node: a single entry in the oid-indexed document arena
//!
//! Nodes reference their parent and children by oid rather than by pointer,
//! so the arena can be cloned, serialized and replayed on another process
//! without fix-ups. `SerializedNode` is the self-contained subtree form used
//! by mutation records and snapshots.

use super::oid::Oid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a node holds, independent of where it sits in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeContent {
    /// An element with a tag name and attributes
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
    },

    /// A run of text
    Text { value: String },
}

impl NodeContent {
    /// Element with no attributes
    pub fn element(tag: impl Into<String>) -> Self {
        NodeContent::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Text content
    pub fn text(value: impl Into<String>) -> Self {
        NodeContent::Text {
            value: value.into(),
        }
    }
}

/// A live node in the arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) oid: Oid,
    pub(crate) parent: Option<Oid>,
    pub(crate) content: NodeContent,
    pub(crate) children: Vec<Oid>,
}

impl Node {
    pub(crate) fn new(oid: Oid, parent: Option<Oid>, content: NodeContent) -> Self {
        Self {
            oid,
            parent,
            content,
            children: Vec::new(),
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn parent(&self) -> Option<&Oid> {
        self.parent.as_ref()
    }

    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    pub fn children(&self) -> &[Oid] {
        &self.children
    }

    pub fn is_text(&self) -> bool {
        matches!(self.content, NodeContent::Text { .. })
    }

    /// Text value, if this is a text node
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Text { value } => Some(value),
            NodeContent::Element { .. } => None,
        }
    }

    /// Tag name, if this is an element
    pub fn tag(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Element { tag, .. } => Some(tag),
            NodeContent::Text { .. } => None,
        }
    }

    /// Attribute value, if this is an element carrying it
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.content {
            NodeContent::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeContent::Text { .. } => None,
        }
    }

    /// Offset space of this node: chars for text, children for elements
    ///
    /// Selection offsets are interpreted against this length.
    pub fn len(&self) -> usize {
        match &self.content {
            NodeContent::Text { value } => value.chars().count(),
            NodeContent::Element { .. } => self.children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Self-contained serialized subtree
///
/// This is the payload of `add`/`remove` records and of snapshots: oid,
/// content and recursively serialized children.
///
/// # Example
///
/// ```rust
/// use stepsync_core::tree::{Oid, SerializedNode};
///
/// let p = SerializedNode::element(Oid::new("p1"), "p")
///     .with_child(SerializedNode::text(Oid::new("t1"), "hello"));
///
/// assert_eq!(p.oids().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub oid: Oid,

    #[serde(flatten)]
    pub content: NodeContent,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
}

impl SerializedNode {
    /// Element subtree with no children yet
    pub fn element(oid: Oid, tag: impl Into<String>) -> Self {
        Self {
            oid,
            content: NodeContent::element(tag),
            children: Vec::new(),
        }
    }

    /// Text leaf
    pub fn text(oid: Oid, value: impl Into<String>) -> Self {
        Self {
            oid,
            content: NodeContent::text(value),
            children: Vec::new(),
        }
    }

    /// Append a child (builder style)
    pub fn with_child(mut self, child: SerializedNode) -> Self {
        self.children.push(child);
        self
    }

    /// Set an attribute (builder style); no-op on text nodes
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let NodeContent::Element { attributes, .. } = &mut self.content {
            attributes.insert(name.into(), value.into());
        }
        self
    }

    /// Every oid in this subtree, pre-order
    pub fn oids(&self) -> Vec<&Oid> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.oid);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}
