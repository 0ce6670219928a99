//! Identity Registry: oid allocation and resolution
//!
//! The registry is the arena index. It owns every live `Node`, hands out
//! fresh oids for locally created nodes, and remembers where retired
//! (removed) nodes used to live so selections pointing at them can fall back
//! to a surviving ancestor.

use super::node::Node;
use super::oid::Oid;
use crate::ParticipantId;
use std::collections::HashMap;

/// Last known placement of a removed node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retired {
    /// Parent the node was detached from
    pub parent: Oid,
    /// Child index it occupied in that parent
    pub index: usize,
}

/// Allocates and resolves oids for one participant's tree
///
/// Allocated oids have the form `{participant}.{session}.{n}`. The session
/// part is random per registry, so a participant that restarts (or resets
/// from a snapshot and keeps editing) never reissues an oid.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    participant: ParticipantId,
    session: String,
    issued: u64,
    nodes: HashMap<Oid, Node>,
    retired: HashMap<Oid, Retired>,
}

impl IdentityRegistry {
    pub fn new(participant: ParticipantId) -> Self {
        let mut session = uuid::Uuid::new_v4().simple().to_string();
        session.truncate(8);
        Self {
            participant,
            session,
            issued: 0,
            nodes: HashMap::new(),
            retired: HashMap::new(),
        }
    }

    /// Mint a brand-new oid. Only called for nodes created locally.
    pub fn allocate(&mut self) -> Oid {
        self.issued += 1;
        Oid::new(format!("{}.{}.{}", self.participant, self.session, self.issued))
    }

    /// Look up a live node
    pub fn resolve(&self, oid: &Oid) -> Option<&Node> {
        self.nodes.get(oid)
    }

    pub(crate) fn resolve_mut(&mut self, oid: &Oid) -> Option<&mut Node> {
        self.nodes.get_mut(oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.nodes.contains_key(oid)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub(crate) fn register(&mut self, node: Node) {
        self.retired.remove(&node.oid);
        self.nodes.insert(node.oid.clone(), node);
    }

    pub(crate) fn unregister(&mut self, oid: &Oid) -> Option<Node> {
        self.nodes.remove(oid)
    }

    /// Remember where a removed subtree root used to be
    pub(crate) fn retire(&mut self, oid: Oid, parent: Oid, index: usize) {
        self.retired.insert(oid, Retired { parent, index });
    }

    /// Where a removed node used to live, if it was ever detached here
    pub fn retired(&self, oid: &Oid) -> Option<&Retired> {
        self.retired.get(oid)
    }

    /// Drop every node and retirement record, keeping the allocator state
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.retired.clear();
    }
}
