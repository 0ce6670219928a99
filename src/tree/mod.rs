//! Document tree: an oid-indexed arena
//!
//! The live tree is stored flat in an `IdentityRegistry`, keyed by oid, with
//! parent/child relations expressed as oid references. Nothing in the engine
//! holds a pointer into the tree, so a `Document` can be cloned as a backup,
//! rebuilt from a snapshot, or driven by records that came from another
//! process.
//!
//! All structural change goes through `apply_record`, which returns the
//! exact inverse computed against the live tree. Local edit helpers
//! (`insert`, `remove`, `set_text`, `set_attribute`) funnel through the same
//! path and are observed by the document's `MutationRecorder`.
//!
//! # Example
//!
//! ```rust
//! use stepsync_core::mutation::Anchor;
//! use stepsync_core::tree::{Document, Oid, SerializedNode};
//!
//! let mut doc = Document::new("c1".to_string(), "div");
//! let p = doc.allocate();
//! let t = doc.allocate();
//! doc.insert(
//!     &Oid::root(),
//!     Anchor::End,
//!     SerializedNode::element(p, "p").with_child(SerializedNode::text(t.clone(), "hi")),
//! )
//! .unwrap();
//! doc.set_text(&t, "hello").unwrap();
//!
//! assert_eq!(doc.to_html(), "<p>hello</p>");
//! assert_eq!(doc.recorder().len(), 2);
//! ```

pub mod markup;
mod node;
mod oid;
mod registry;

pub use node::{Node, NodeContent, SerializedNode};
pub use oid::{Oid, ROOT_OID};
pub use registry::{IdentityRegistry, Retired};

use crate::config::DEFAULT_ROOT_TAG;
use crate::error::{Result, SyncError};
use crate::mutation::{Anchor, MutationRecord, MutationRecorder};
use crate::ParticipantId;
use std::collections::{BTreeMap, HashSet};

/// The live document tree of one participant
#[derive(Debug, Clone)]
pub struct Document {
    registry: IdentityRegistry,
    recorder: MutationRecorder,
}

impl Document {
    /// Empty document: a root element with no children
    pub fn new(participant: ParticipantId, root_tag: &str) -> Self {
        let mut registry = IdentityRegistry::new(participant);
        registry.register(Node::new(Oid::root(), None, NodeContent::element(root_tag)));
        Self {
            registry,
            recorder: MutationRecorder::new(),
        }
    }

    /// Build a document from a serialized root
    pub fn from_serialized(participant: ParticipantId, root: &SerializedNode) -> Result<Self> {
        let mut doc = Self::new(participant, DEFAULT_ROOT_TAG);
        doc.reset(root)?;
        Ok(doc)
    }

    /// Replace the whole tree with a serialized root
    ///
    /// The allocator keeps its state, so oids minted after a reset never
    /// collide with oids minted before it.
    pub fn reset(&mut self, root: &SerializedNode) -> Result<()> {
        if !root.oid.is_root() {
            return Err(SyncError::NodeNotFound(Oid::root()));
        }
        if !matches!(root.content, NodeContent::Element { .. }) {
            return Err(SyncError::NotElement(root.oid.clone()));
        }
        check_unique(root)?;

        self.registry.clear();
        let _ = self.recorder.take();
        self.register_subtree(root, None);
        Ok(())
    }

    /// Mint an oid for a node about to be created locally
    pub fn allocate(&mut self) -> Oid {
        self.registry.allocate()
    }

    /// Resolve an oid against the live tree
    pub fn resolve(&self, oid: &Oid) -> Option<&Node> {
        self.registry.resolve(oid)
    }

    /// Resolve an oid, treating absence as an error
    pub fn node(&self, oid: &Oid) -> Result<&Node> {
        self.registry
            .resolve(oid)
            .ok_or_else(|| SyncError::NodeNotFound(oid.clone()))
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.registry.contains(oid)
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &MutationRecorder {
        &self.recorder
    }

    pub(crate) fn recorder_mut(&mut self) -> &mut MutationRecorder {
        &mut self.recorder
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() <= 1
    }

    /// Parent oid and child index of a live node
    pub fn position_in_parent(&self, oid: &Oid) -> Option<(&Oid, usize)> {
        let parent = self.registry.resolve(oid)?.parent.as_ref()?;
        let index = self
            .registry
            .resolve(parent)?
            .children
            .iter()
            .position(|child| child == oid)?;
        Some((parent, index))
    }

    /// The sibling immediately before a live node
    pub fn previous_sibling(&self, oid: &Oid) -> Option<&Node> {
        let (parent, index) = self.position_in_parent(oid)?;
        let prev = self.registry.resolve(parent)?.children.get(index.checked_sub(1)?)?;
        self.registry.resolve(prev)
    }

    /// Run `f` with the recorder suppressed
    ///
    /// Used for every apply/revert of history so that replays are never
    /// mistaken for local edits.
    pub fn unobserved<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.recorder.suppress();
        let out = f(self);
        self.recorder.resume();
        out
    }

    // --- local edits (observed) ---

    /// Insert a subtree under `parent`
    pub fn insert(&mut self, parent: &Oid, anchor: Anchor, node: SerializedNode) -> Result<()> {
        let inverse = self.apply_add(parent, &anchor, &node)?;
        self.observe(inverse);
        Ok(())
    }

    /// Remove a subtree
    pub fn remove(&mut self, oid: &Oid) -> Result<()> {
        let inverse = self.apply_remove(oid)?;
        self.observe(inverse);
        Ok(())
    }

    /// Replace a text node's value
    pub fn set_text(&mut self, oid: &Oid, value: impl Into<String>) -> Result<()> {
        let inverse = self.apply_text(oid, value.into())?;
        self.observe(inverse);
        Ok(())
    }

    /// Set or clear an element attribute
    pub fn set_attribute(&mut self, oid: &Oid, name: &str, value: Option<String>) -> Result<()> {
        let inverse = self.apply_attribute(oid, name, value)?;
        self.observe(inverse);
        Ok(())
    }

    // --- record application ---

    /// Apply one record, returning its exact inverse for the current tree
    pub fn apply_record(&mut self, record: &MutationRecord) -> Result<MutationRecord> {
        let inverse = match record {
            MutationRecord::Add {
                parent,
                anchor,
                node,
            } => self.apply_add(parent, anchor, node)?,
            MutationRecord::Remove { oid, .. } => self.apply_remove(oid)?,
            MutationRecord::Text { oid, value, .. } => self.apply_text(oid, value.clone())?,
            MutationRecord::Attribute {
                oid, name, value, ..
            } => self.apply_attribute(oid, name, value.clone())?,
        };
        self.observe(inverse.clone());
        Ok(inverse)
    }

    /// Apply a batch atomically
    ///
    /// Returns the inverses in application order. If any record fails, the
    /// records already applied are rolled back and the tree is left exactly
    /// as it was.
    pub fn apply(&mut self, records: &[MutationRecord]) -> Result<Vec<MutationRecord>> {
        let observed_before = self.recorder.len();
        let mut inverses = Vec::with_capacity(records.len());
        for record in records {
            match self.apply_record(record) {
                Ok(inverse) => inverses.push(inverse),
                Err(err) => {
                    self.rollback(&inverses);
                    self.recorder.truncate(observed_before);
                    return Err(err);
                }
            }
        }
        Ok(inverses)
    }

    /// Undo a batch given the inverses `apply` returned for it
    pub fn revert(&mut self, inverses: &[MutationRecord]) -> Result<()> {
        let reversed: Vec<MutationRecord> = inverses.iter().rev().cloned().collect();
        self.apply(&reversed).map(|_| ())
    }

    fn rollback(&mut self, inverses: &[MutationRecord]) {
        self.unobserved(|doc| {
            for inverse in inverses.iter().rev() {
                if let Err(err) = doc.apply_record(inverse) {
                    tracing::error!(%err, target = %inverse.target(), "rollback of a just-applied record failed");
                }
            }
        });
    }

    fn observe(&mut self, inverse: MutationRecord) {
        if !self.recorder.is_suppressed() {
            self.recorder.record(inverse.inverse(), inverse);
        }
    }

    fn apply_add(&mut self, parent: &Oid, anchor: &Anchor, node: &SerializedNode) -> Result<MutationRecord> {
        let parent_node = self.node(parent)?;
        if parent_node.is_text() {
            return Err(SyncError::NotElement(parent.clone()));
        }
        check_unique(node)?;
        if let Some(existing) = node.oids().into_iter().find(|oid| self.registry.contains(oid)) {
            return Err(SyncError::DuplicateNode(existing.clone()));
        }
        let index = anchor_index(parent_node, anchor)?;
        let inverse_anchor = anchor_at(parent_node, index);

        self.register_subtree(node, Some(parent.clone()));
        if let Some(parent_node) = self.registry.resolve_mut(parent) {
            parent_node.children.insert(index, node.oid.clone());
        }

        Ok(MutationRecord::Remove {
            oid: node.oid.clone(),
            parent: parent.clone(),
            anchor: inverse_anchor,
            node: node.clone(),
        })
    }

    fn apply_remove(&mut self, oid: &Oid) -> Result<MutationRecord> {
        if oid.is_root() {
            return Err(SyncError::RootRemoval);
        }
        let node = self.node(oid)?;
        let parent = node.parent.clone().ok_or(SyncError::RootRemoval)?;
        let serialized = self.serialize_node(node);
        let parent_node = self.node(&parent)?;
        let index = parent_node
            .children
            .iter()
            .position(|child| child == oid)
            .ok_or_else(|| SyncError::AnchorNotFound {
                parent: parent.clone(),
                anchor: oid.clone(),
            })?;
        let anchor = anchor_at(parent_node, index);

        if let Some(parent_node) = self.registry.resolve_mut(&parent) {
            parent_node.children.remove(index);
        }
        self.unregister_subtree(oid);
        self.registry.retire(oid.clone(), parent.clone(), index);

        Ok(MutationRecord::Add {
            parent,
            anchor,
            node: serialized,
        })
    }

    fn apply_text(&mut self, oid: &Oid, value: String) -> Result<MutationRecord> {
        let node = self
            .registry
            .resolve_mut(oid)
            .ok_or_else(|| SyncError::NodeNotFound(oid.clone()))?;
        let NodeContent::Text { value: current } = &mut node.content else {
            return Err(SyncError::NotText(oid.clone()));
        };
        let old_value = std::mem::replace(current, value.clone());
        Ok(MutationRecord::Text {
            oid: oid.clone(),
            old_value: value,
            value: old_value,
        })
    }

    fn apply_attribute(&mut self, oid: &Oid, name: &str, value: Option<String>) -> Result<MutationRecord> {
        let node = self
            .registry
            .resolve_mut(oid)
            .ok_or_else(|| SyncError::NodeNotFound(oid.clone()))?;
        let NodeContent::Element { attributes, .. } = &mut node.content else {
            return Err(SyncError::NotElement(oid.clone()));
        };
        let old_value = match &value {
            Some(v) => attributes.insert(name.to_string(), v.clone()),
            None => attributes.remove(name),
        };
        Ok(MutationRecord::Attribute {
            oid: oid.clone(),
            name: name.to_string(),
            old_value: value,
            value: old_value,
        })
    }

    fn register_subtree(&mut self, node: &SerializedNode, parent: Option<Oid>) {
        let mut live = Node::new(node.oid.clone(), parent, node.content.clone());
        live.children = node.children.iter().map(|child| child.oid.clone()).collect();
        self.registry.register(live);
        for child in &node.children {
            self.register_subtree(child, Some(node.oid.clone()));
        }
    }

    fn unregister_subtree(&mut self, oid: &Oid) {
        if let Some(node) = self.registry.unregister(oid) {
            for (index, child) in node.children.iter().enumerate() {
                self.unregister_subtree(child);
                self.registry.retire(child.clone(), oid.clone(), index);
            }
        }
    }

    // --- serialization ---

    fn serialize_node(&self, node: &Node) -> SerializedNode {
        SerializedNode {
            oid: node.oid.clone(),
            content: node.content.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.registry.resolve(child))
                .map(|child| self.serialize_node(child))
                .collect(),
        }
    }

    /// Serialize the subtree rooted at `oid`
    pub fn serialize_subtree(&self, oid: &Oid) -> Result<SerializedNode> {
        Ok(self.serialize_node(self.node(oid)?))
    }

    /// Serialize the whole tree
    pub fn to_serialized(&self) -> SerializedNode {
        match self.registry.resolve(&Oid::root()) {
            Some(root) => self.serialize_node(root),
            None => SerializedNode::element(Oid::root(), DEFAULT_ROOT_TAG),
        }
    }

    /// Canonical JSON of the whole tree, for byte-level comparisons
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_serialized())?)
    }

    /// Render the content of the root as HTML
    pub fn to_html(&self) -> String {
        markup::render(self, &BTreeMap::new())
    }

    /// Every live node in document order (pre-order from the root)
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = Vec::with_capacity(self.registry.len());
        let mut stack: Vec<&Node> = self.registry.resolve(&Oid::root()).into_iter().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter_map(|child| self.registry.resolve(child)),
            );
        }
        out
    }
}

fn anchor_index(parent: &Node, anchor: &Anchor) -> Result<usize> {
    let position = |sibling: &Oid| {
        parent
            .children
            .iter()
            .position(|child| child == sibling)
            .ok_or_else(|| SyncError::AnchorNotFound {
                parent: parent.oid.clone(),
                anchor: sibling.clone(),
            })
    };
    match anchor {
        Anchor::Start => Ok(0),
        Anchor::End => Ok(parent.children.len()),
        Anchor::After(sibling) => Ok(position(sibling)? + 1),
        Anchor::Before(sibling) => position(sibling),
    }
}

/// Anchor that re-inserts a node at `index` of `parent`
fn anchor_at(parent: &Node, index: usize) -> Anchor {
    match index.checked_sub(1).and_then(|prev| parent.children.get(prev)) {
        Some(prev) => Anchor::After(prev.clone()),
        None => Anchor::Start,
    }
}

fn check_unique(node: &SerializedNode) -> Result<()> {
    let mut seen = HashSet::new();
    for oid in node.oids() {
        if !seen.insert(oid) {
            return Err(SyncError::DuplicateNode(oid.clone()));
        }
    }
    Ok(())
}
