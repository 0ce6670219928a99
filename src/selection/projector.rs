/// Selection Projector
///
/// Tracks the last-known selection of every participant (the local one
/// included) and projects them onto the live tree after any apply, revert or
/// rebase. A selection whose node was removed degrades to the boundary of the
/// nearest surviving ancestor; projection never fails.
use super::{Position, ResolvedSelection, SelectionSnapshot};
use crate::tree::{Document, Oid};
use crate::ParticipantId;
use std::collections::{BTreeMap, HashSet};

/// Last-known selections keyed by participant
#[derive(Debug, Clone)]
pub struct SelectionProjector {
    local_id: ParticipantId,
    selections: BTreeMap<ParticipantId, SelectionSnapshot>,
}

impl SelectionProjector {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            selections: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Record a participant's selection (from a step or a local move)
    pub fn update(&mut self, participant: ParticipantId, selection: SelectionSnapshot) {
        self.selections.insert(participant, selection);
    }

    /// Drop a departed participant; returns what was known about them
    pub fn forget(&mut self, participant: &str) -> Option<SelectionSnapshot> {
        self.selections.remove(participant)
    }

    pub fn get(&self, participant: &str) -> Option<&SelectionSnapshot> {
        self.selections.get(participant)
    }

    pub fn get_local(&self) -> Option<&SelectionSnapshot> {
        self.get(&self.local_id)
    }

    /// Every known selection, raw
    pub fn selections(&self) -> &BTreeMap<ParticipantId, SelectionSnapshot> {
        &self.selections
    }

    /// Replace everything known (after a reset from a snapshot)
    pub fn replace_all(&mut self, selections: BTreeMap<ParticipantId, SelectionSnapshot>) {
        self.selections = selections;
    }

    /// Number of participants with a known selection
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Resolve one participant's selection against the live tree
    pub fn project(&self, doc: &Document, participant: &str) -> Option<ResolvedSelection> {
        self.selections.get(participant).map(|sel| resolve(doc, sel))
    }

    /// Resolve every known selection against the live tree
    pub fn project_all(&self, doc: &Document) -> BTreeMap<ParticipantId, ResolvedSelection> {
        self.selections
            .iter()
            .map(|(participant, sel)| (participant.clone(), resolve(doc, sel)))
            .collect()
    }
}

/// Resolve a selection snapshot against the live tree
pub fn resolve(doc: &Document, selection: &SelectionSnapshot) -> ResolvedSelection {
    let (anchor, anchor_degraded) = resolve_position(doc, &selection.anchor());
    let (focus, focus_degraded) = resolve_position(doc, &selection.focus());
    ResolvedSelection {
        anchor,
        focus,
        degraded: anchor_degraded || focus_degraded,
    }
}

/// Resolve a single position; the flag is set when it had to fall back
///
/// Live nodes clamp the offset to their length. Removed nodes follow the
/// retired trail (parent, index) upward until a live ancestor is found. With
/// no trail at all the position lands at the start of the root.
pub fn resolve_position(doc: &Document, position: &Position) -> (Position, bool) {
    if let Some(node) = doc.resolve(&position.oid) {
        return (Position::new(position.oid.clone(), position.offset.min(node.len())), false);
    }

    let registry = doc.registry();
    let mut seen: HashSet<&Oid> = HashSet::new();
    let mut current = &position.oid;
    while let Some(retired) = registry.retired(current) {
        if !seen.insert(current) {
            break;
        }
        if let Some(parent) = doc.resolve(&retired.parent) {
            return (Position::new(retired.parent.clone(), retired.index.min(parent.len())), true);
        }
        current = &retired.parent;
    }
    (Position::new(Oid::root(), 0), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Anchor;
    use crate::tree::SerializedNode;

    fn setup() -> (Document, Oid, Oid) {
        let mut doc = Document::new("c1".to_string(), "div");
        let p = doc.allocate();
        let t = doc.allocate();
        doc.insert(
            &Oid::root(),
            Anchor::End,
            SerializedNode::element(p.clone(), "p").with_child(SerializedNode::text(t.clone(), "hello")),
        )
        .unwrap();
        (doc, p, t)
    }

    #[test]
    fn test_update_and_get() {
        let mut projector = SelectionProjector::new("c1".to_string());
        projector.update("c1".to_string(), SelectionSnapshot::collapsed(Oid::root(), 0));
        projector.update("c2".to_string(), SelectionSnapshot::collapsed(Oid::root(), 0));

        assert_eq!(projector.len(), 2);
        assert!(projector.get_local().is_some());
        assert!(projector.forget("c2").is_some());
        assert!(projector.get("c2").is_none());
    }

    #[test]
    fn test_live_position_is_clamped() {
        let (doc, _, t) = setup();
        let (pos, degraded) = resolve_position(&doc, &Position::new(t.clone(), 99));
        assert_eq!(pos, Position::new(t, 5));
        assert!(!degraded);
    }

    #[test]
    fn test_removed_node_falls_back_to_parent() {
        let (mut doc, p, t) = setup();
        doc.remove(&t).unwrap();

        let (pos, degraded) = resolve_position(&doc, &Position::new(t, 3));
        assert_eq!(pos, Position::new(p, 0));
        assert!(degraded);
    }

    #[test]
    fn test_removed_ancestor_walks_up() {
        let (mut doc, p, t) = setup();
        let q = doc.allocate();
        doc.insert(&Oid::root(), Anchor::Start, SerializedNode::element(q, "p"))
            .unwrap();
        doc.remove(&p).unwrap();

        let sel = SelectionSnapshot::collapsed(t, 2);
        let resolved = resolve(&doc, &sel);
        assert_eq!(resolved.anchor, Position::new(Oid::root(), 1));
        assert!(resolved.degraded);
    }

    #[test]
    fn test_unknown_oid_lands_on_root() {
        let (doc, _, _) = setup();
        let (pos, degraded) = resolve_position(&doc, &Position::new(Oid::new("ghost"), 4));
        assert_eq!(pos, Position::new(Oid::root(), 0));
        assert!(degraded);
    }
}
