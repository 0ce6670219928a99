/// Step Store
///
/// The local history: a base step id followed by every applied step in
/// canonical order. Each entry keeps the inverse records captured from the
/// live tree when the step was (re)applied, so reverting is exact no matter
/// how often the step has been moved by a rebase.
use super::snapshot::Snapshot;
use super::step::{Step, StepId};
use crate::error::{Result, SyncError};
use crate::mutation::MutationRecord;
use crate::selection::SelectionSnapshot;
use crate::tree::Document;
use crate::ParticipantId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Entry {
    step: Step,
    /// Inverses in application order; revert applies them back to front
    inverse: Vec<MutationRecord>,
}

/// Ordered history of applied steps
#[derive(Debug, Clone)]
pub struct StepStore {
    base: StepId,
    entries: Vec<Entry>,
    index: HashMap<StepId, usize>,
}

impl Default for StepStore {
    fn default() -> Self {
        Self::new(StepId::init())
    }
}

impl StepStore {
    /// Empty history rooted at `base`
    pub fn new(base: StepId) -> Self {
        Self {
            base,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The step every entry descends from
    pub fn base(&self) -> &StepId {
        &self.base
    }

    /// Id of the last applied step (the base if nothing was applied)
    pub fn tip(&self) -> &StepId {
        self.entries.last().map(|e| &e.step.id).unwrap_or(&self.base)
    }

    /// Number of applied steps, base excluded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is the base or an applied step
    pub fn contains(&self, id: &StepId) -> bool {
        *id == self.base || self.index.contains_key(id)
    }

    /// Position of an applied step (the base has none)
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &StepId) -> Option<&Step> {
        self.position(id).map(|i| &self.entries[i].step)
    }

    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.entries.get(index).map(|e| &e.step)
    }

    /// Captured inverses of an applied step, in application order
    pub fn inverse_of(&self, id: &StepId) -> Option<&[MutationRecord]> {
        self.position(id).map(|i| self.entries[i].inverse.as_slice())
    }

    /// Applied steps in history order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.entries.iter().map(|e| &e.step)
    }

    /// Base id followed by every applied step id
    pub fn step_ids(&self) -> Vec<&StepId> {
        std::iter::once(&self.base)
            .chain(self.entries.iter().map(|e| &e.step.id))
            .collect()
    }

    /// Append a step already applied to the tree
    pub fn append(&mut self, step: Step, inverse: Vec<MutationRecord>) {
        self.index.insert(step.id.clone(), self.entries.len());
        self.entries.push(Entry { step, inverse });
    }

    /// Apply a step's mutations without recording them as local edits
    ///
    /// Atomic: on failure the tree is untouched.
    pub fn apply(doc: &mut Document, step: &Step) -> Result<Vec<MutationRecord>> {
        doc.unobserved(|doc| doc.apply(&step.mutations))
    }

    /// Apply a step to the tree and append it
    pub fn apply_and_append(&mut self, doc: &mut Document, step: Step) -> Result<()> {
        let inverse = Self::apply(doc, &step)?;
        self.append(step, inverse);
        Ok(())
    }

    /// Revert every step from `index` to the tip, newest first
    ///
    /// Returns the reverted steps in their original order. On failure the
    /// steps reverted so far stay reverted; callers keep a backup.
    pub fn revert_from(&mut self, doc: &mut Document, index: usize) -> Result<Vec<Step>> {
        let mut reverted = Vec::with_capacity(self.entries.len().saturating_sub(index));
        while self.entries.len() > index {
            let Some(entry) = self.entries.pop() else {
                break;
            };
            doc.unobserved(|doc| doc.revert(&entry.inverse))?;
            self.index.remove(&entry.step.id);
            reverted.push(entry.step);
        }
        reverted.reverse();
        Ok(reverted)
    }

    /// Revert a single applied step in place
    ///
    /// Only the tip can be reverted without disturbing later steps.
    pub fn revert_tip(&mut self, doc: &mut Document) -> Result<Option<Step>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let mut reverted = self.revert_from(doc, self.entries.len() - 1)?;
        Ok(reverted.pop())
    }

    /// Full snapshot at the current tip
    pub fn get_snapshot(&self, doc: &Document, selections: BTreeMap<ParticipantId, SelectionSnapshot>) -> Snapshot {
        Snapshot {
            step_id: self.tip().clone(),
            root: doc.to_serialized(),
            selections,
        }
    }

    /// Replace tree and history with a snapshot
    ///
    /// History restarts with the snapshot's step as its base. On error
    /// nothing changes.
    pub fn reset_and_sync(&mut self, doc: &mut Document, snapshot: &Snapshot) -> Result<()> {
        doc.reset(&snapshot.root)?;
        self.base = snapshot.step_id.clone();
        self.entries.clear();
        self.index.clear();
        Ok(())
    }

    /// Index of the step with this id, as an error when absent
    pub fn require(&self, id: &StepId) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| SyncError::UnknownStep(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Anchor;
    use crate::tree::{Oid, SerializedNode};

    fn text_step(id: &str, previous: &StepId, oid: &Oid, value: &str) -> Step {
        Step {
            id: StepId::new(id),
            previous: previous.clone(),
            author: "c1".to_string(),
            selection: SelectionSnapshot::collapsed(oid.clone(), 0),
            mutations: vec![MutationRecord::Text {
                oid: oid.clone(),
                old_value: String::new(),
                value: value.to_string(),
            }],
        }
    }

    fn doc_with_text() -> (Document, Oid) {
        let mut doc = Document::new("c1".to_string(), "div");
        let t = Oid::new("t");
        doc.unobserved(|doc| doc.insert(&Oid::root(), Anchor::End, SerializedNode::text(t.clone(), "a")))
            .unwrap();
        (doc, t)
    }

    #[test]
    fn test_append_and_lookup() {
        let (mut doc, t) = doc_with_text();
        let mut store = StepStore::default();
        assert_eq!(store.tip(), &StepId::init());

        let s1 = text_step("s1", store.tip(), &t, "ab");
        store.apply_and_append(&mut doc, s1).unwrap();
        let s2 = text_step("s2", store.tip(), &t, "abc");
        store.apply_and_append(&mut doc, s2).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.tip(), &StepId::new("s2"));
        assert_eq!(store.position(&StepId::new("s1")), Some(0));
        assert!(store.contains(&StepId::init()));
        assert_eq!(
            store.step_ids(),
            vec![&StepId::init(), &StepId::new("s1"), &StepId::new("s2")]
        );
        assert_eq!(doc.to_html(), "abc");
        assert!(doc.recorder().is_empty());
    }

    #[test]
    fn test_revert_from_restores_exact_state() {
        let (mut doc, t) = doc_with_text();
        let before = doc.to_json().unwrap();
        let mut store = StepStore::default();

        for (id, value) in [("s1", "ab"), ("s2", "abc"), ("s3", "x")] {
            let step = text_step(id, store.tip(), &t, value);
            store.apply_and_append(&mut doc, step).unwrap();
        }

        let reverted = store.revert_from(&mut doc, 1).unwrap();
        let ids: Vec<&str> = reverted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
        assert_eq!(doc.to_html(), "ab");
        assert!(!store.contains(&StepId::new("s3")));

        store.revert_tip(&mut doc).unwrap();
        assert_eq!(doc.to_json().unwrap(), before);
        assert_eq!(store.revert_tip(&mut doc).unwrap(), None);
    }

    #[test]
    fn test_failed_apply_leaves_store_untouched() {
        let (mut doc, _) = doc_with_text();
        let mut store = StepStore::default();
        let bad = text_step("s1", store.tip(), &Oid::new("ghost"), "x");

        let err = store.apply_and_append(&mut doc, bad).unwrap_err();
        assert!(err.is_divergence());
        assert!(store.is_empty());
        assert_eq!(doc.to_html(), "a");
    }

    #[test]
    fn test_snapshot_and_reset() {
        let (mut doc, t) = doc_with_text();
        let mut store = StepStore::default();
        let step = text_step("s1", store.tip(), &t, "hello");
        store.apply_and_append(&mut doc, step).unwrap();

        let snapshot = store.get_snapshot(&doc, BTreeMap::new());
        assert_eq!(snapshot.step_id, StepId::new("s1"));

        let mut other_doc = Document::new("c2".to_string(), "div");
        let mut other = StepStore::default();
        other.reset_and_sync(&mut other_doc, &snapshot).unwrap();

        assert_eq!(other.base(), &StepId::new("s1"));
        assert_eq!(other.tip(), &StepId::new("s1"));
        assert!(other.is_empty());
        assert_eq!(other_doc.to_json().unwrap(), doc.to_json().unwrap());
    }

    #[test]
    fn test_require_unknown_step() {
        let store = StepStore::default();
        assert!(matches!(
            store.require(&StepId::new("nope")),
            Err(SyncError::UnknownStep(_))
        ));
    }
}
