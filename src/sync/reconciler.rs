//! Reconciler: places an incoming step into local history
//!
//! History is kept in canonical order: the depth-first pre-order of the step
//! tree, with the children of any step visited in ascending id order. Two
//! participants holding the same set of steps therefore hold them in the
//! same order, whatever order they arrived in.
//!
//! # Decision table
//!
//! ```text
//! step.id already in history         -> Duplicate (ignored)
//! step.previous not in history       -> UnknownAncestor (resync, nothing applied)
//! canonical slot is the end          -> Append
//! canonical slot is index i < len    -> Rebase { at: i }
//!                                       revert [i..] newest first,
//!                                       apply step, reapply [i..] in order
//! ```
//!
//! Any apply/revert failure during a rebase restores the pre-reconciliation
//! tree and history and is reported as an error; the caller escalates to
//! resynchronization.

use crate::error::Result;
use crate::history::{Step, StepId, StepStore};
use crate::tree::Document;
use std::collections::HashSet;

/// What the reconciler intends to do with a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Duplicate,
    UnknownAncestor,
    Append,
    Rebase { at: usize },
}

/// What happened to an incoming step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Already in history
    Duplicate,
    /// Applied at the tip
    Appended,
    /// Applied after reverting and later reapplying `reverted` steps
    Rebased { reverted: usize },
    /// Ancestor missing; nothing applied
    UnknownAncestor,
    /// The rebase would revert more steps than allowed; nothing applied
    RebaseTooDeep { depth: usize },
    /// Apply/revert failed; state was restored
    Diverged,
    /// Dropped while a resynchronization is pending
    Dropped,
}

impl Reconciliation {
    /// Short name, as reported to hosts
    pub fn kind(&self) -> &'static str {
        match self {
            Reconciliation::Duplicate => "duplicate",
            Reconciliation::Appended => "appended",
            Reconciliation::Rebased { .. } => "rebased",
            Reconciliation::UnknownAncestor => "unknown_ancestor",
            Reconciliation::RebaseTooDeep { .. } => "rebase_too_deep",
            Reconciliation::Diverged => "diverged",
            Reconciliation::Dropped => "dropped",
        }
    }

    /// Whether the step ended up in history
    pub fn is_applied(&self) -> bool {
        matches!(self, Reconciliation::Appended | Reconciliation::Rebased { .. })
    }

    /// Whether this outcome calls for a resynchronization
    pub fn needs_resync(&self) -> bool {
        matches!(
            self,
            Reconciliation::UnknownAncestor | Reconciliation::RebaseTooDeep { .. } | Reconciliation::Diverged
        )
    }
}

/// Stateless placement logic, parameterized by the rebase cap
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    max_rebase_steps: Option<usize>,
}

impl Reconciler {
    pub fn new(max_rebase_steps: Option<usize>) -> Self {
        Self { max_rebase_steps }
    }

    pub fn max_rebase_steps(&self) -> Option<usize> {
        self.max_rebase_steps
    }

    /// Decide where `step` goes without touching anything
    pub fn plan(store: &StepStore, step: &Step) -> Plan {
        if store.contains(&step.id) {
            return Plan::Duplicate;
        }
        match insertion_index(store, step) {
            None => Plan::UnknownAncestor,
            Some(at) if at == store.len() => Plan::Append,
            Some(at) => Plan::Rebase { at },
        }
    }

    /// Place `step` into history, mutating tree and store
    ///
    /// On error both are exactly as they were before the call.
    pub fn execute(&self, store: &mut StepStore, doc: &mut Document, step: Step) -> Result<Reconciliation> {
        match Self::plan(store, &step) {
            Plan::Duplicate => {
                tracing::debug!(step = %step.id, "duplicate step ignored");
                Ok(Reconciliation::Duplicate)
            }
            Plan::UnknownAncestor => {
                tracing::warn!(step = %step.id, previous = %step.previous, "step has unknown ancestor");
                Ok(Reconciliation::UnknownAncestor)
            }
            Plan::Append => {
                let id = step.id.clone();
                store.apply_and_append(doc, step)?;
                tracing::debug!(step = %id, "step appended");
                Ok(Reconciliation::Appended)
            }
            Plan::Rebase { at } => {
                let depth = store.len() - at;
                if let Some(max) = self.max_rebase_steps {
                    if depth > max {
                        tracing::warn!(step = %step.id, depth, max, "rebase too deep");
                        return Ok(Reconciliation::RebaseTooDeep { depth });
                    }
                }

                let id = step.id.clone();
                let backup = (doc.clone(), store.clone());
                match rebase(store, doc, at, step) {
                    Ok(()) => {
                        tracing::info!(step = %id, at, reverted = depth, "step rebased into history");
                        Ok(Reconciliation::Rebased { reverted: depth })
                    }
                    Err(err) => {
                        tracing::warn!(step = %id, %err, "rebase failed, restoring previous state");
                        *doc = backup.0;
                        *store = backup.1;
                        Err(err)
                    }
                }
            }
        }
    }
}

/// Canonical slot for `step`, or `None` when its parent is unknown
///
/// Scans forward from the parent: earlier siblings (smaller ids) and their
/// descendants are skipped, and the scan stops at the first later sibling or
/// at the first step outside the parent's subtree.
pub fn insertion_index(store: &StepStore, step: &Step) -> Option<usize> {
    let parent = &step.previous;
    let start = if parent == store.base() {
        0
    } else {
        store.position(parent)? + 1
    };

    let mut subtree: HashSet<&StepId> = HashSet::new();
    subtree.insert(parent);
    for index in start..store.len() {
        let existing = store.step_at(index)?;
        if existing.previous == *parent && existing.id > step.id {
            return Some(index);
        }
        if !subtree.contains(&existing.previous) {
            return Some(index);
        }
        subtree.insert(&existing.id);
    }
    Some(store.len())
}

fn rebase(store: &mut StepStore, doc: &mut Document, at: usize, step: Step) -> Result<()> {
    let reverted = store.revert_from(doc, at)?;
    store.apply_and_append(doc, step)?;
    for later in reverted {
        store.apply_and_append(doc, later)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Anchor, MutationRecord};
    use crate::selection::SelectionSnapshot;
    use crate::tree::{Oid, SerializedNode};

    fn add_step(id: &str, previous: &str, value: &str) -> Step {
        Step {
            id: StepId::new(id),
            previous: StepId::new(previous),
            author: id.split('-').next().unwrap_or(id).to_string(),
            selection: SelectionSnapshot::collapsed(Oid::root(), 0),
            mutations: vec![MutationRecord::Add {
                parent: Oid::root(),
                anchor: Anchor::End,
                node: SerializedNode::text(Oid::new(format!("t-{}", id)), value),
            }],
        }
    }

    fn ids(store: &StepStore) -> Vec<&str> {
        store.steps().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_plan_decisions() {
        let mut doc = Document::new("x".to_string(), "div");
        let mut store = StepStore::default();
        store.apply_and_append(&mut doc, add_step("a-1", "init", "a")).unwrap();

        assert_eq!(Reconciler::plan(&store, &add_step("a-1", "init", "a")), Plan::Duplicate);
        assert_eq!(Reconciler::plan(&store, &add_step("b-1", "ghost", "b")), Plan::UnknownAncestor);
        assert_eq!(Reconciler::plan(&store, &add_step("b-1", "a-1", "b")), Plan::Append);
        assert_eq!(Reconciler::plan(&store, &add_step("b-1", "init", "b")), Plan::Append);
        assert_eq!(Reconciler::plan(&store, &add_step("0-1", "init", "0")), Plan::Rebase { at: 0 });
    }

    #[test]
    fn test_sibling_subtrees_stay_contiguous() {
        let mut doc = Document::new("x".to_string(), "div");
        let mut store = StepStore::default();
        let reconciler = Reconciler::default();

        // b-1 <- b-2 arrive first, then a-1 (sorts before b-1)
        for step in [add_step("b-1", "init", "b"), add_step("b-2", "b-1", "B")] {
            reconciler.execute(&mut store, &mut doc, step).unwrap();
        }
        let outcome = reconciler
            .execute(&mut store, &mut doc, add_step("a-1", "init", "a"))
            .unwrap();
        assert_eq!(outcome, Reconciliation::Rebased { reverted: 2 });
        assert_eq!(ids(&store), vec!["a-1", "b-1", "b-2"]);
        assert_eq!(doc.to_html(), "abB");

        // child of a-1 goes right after it, before the b subtree
        reconciler
            .execute(&mut store, &mut doc, add_step("c-1", "a-1", "c"))
            .unwrap();
        assert_eq!(ids(&store), vec!["a-1", "c-1", "b-1", "b-2"]);
        assert_eq!(doc.to_html(), "acbB");

        // a later sibling of everything goes last
        reconciler
            .execute(&mut store, &mut doc, add_step("z-1", "init", "z"))
            .unwrap();
        assert_eq!(ids(&store), vec!["a-1", "c-1", "b-1", "b-2", "z-1"]);
    }

    #[test]
    fn test_three_way_order_is_delivery_independent() {
        let steps = [
            add_step("c-1", "init", "c"),
            add_step("a-1", "init", "a"),
            add_step("b-1", "init", "b"),
            add_step("a-2", "a-1", "A"),
        ];
        let orders = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 1, 3]];
        let reconciler = Reconciler::default();

        let mut results = Vec::new();
        for order in orders {
            let mut doc = Document::new("x".to_string(), "div");
            let mut store = StepStore::default();
            let mut pending: Vec<Step> = order.iter().map(|&i| steps[i].clone()).collect();
            // deliver, retrying steps whose parent has not arrived yet
            while !pending.is_empty() {
                let step = pending.remove(0);
                match reconciler.execute(&mut store, &mut doc, step.clone()).unwrap() {
                    Reconciliation::UnknownAncestor => pending.push(step),
                    outcome => assert!(outcome.is_applied()),
                }
            }
            results.push((doc.to_html(), ids(&store).join(",")));
        }

        for result in &results {
            assert_eq!(result, &("aAbc".to_string(), "a-1,a-2,b-1,c-1".to_string()));
        }
    }

    #[test]
    fn test_failed_rebase_restores_state() {
        let mut doc = Document::new("x".to_string(), "div");
        let mut store = StepStore::default();
        let reconciler = Reconciler::default();
        reconciler
            .execute(&mut store, &mut doc, add_step("b-1", "init", "b"))
            .unwrap();
        let before = doc.to_json().unwrap();

        let mut bad = add_step("a-1", "init", "a");
        bad.mutations.push(MutationRecord::Remove {
            oid: Oid::new("ghost"),
            parent: Oid::root(),
            anchor: Anchor::Start,
            node: SerializedNode::text(Oid::new("ghost"), ""),
        });

        let err = reconciler.execute(&mut store, &mut doc, bad).unwrap_err();
        assert!(err.is_divergence());
        assert_eq!(doc.to_json().unwrap(), before);
        assert_eq!(ids(&store), vec!["b-1"]);
    }

    #[test]
    fn test_rebase_cap() {
        let mut doc = Document::new("x".to_string(), "div");
        let mut store = StepStore::default();
        let reconciler = Reconciler::new(Some(1));
        reconciler
            .execute(&mut store, &mut doc, add_step("b-1", "init", "b"))
            .unwrap();
        reconciler
            .execute(&mut store, &mut doc, add_step("b-2", "b-1", "B"))
            .unwrap();

        let outcome = reconciler
            .execute(&mut store, &mut doc, add_step("a-1", "init", "a"))
            .unwrap();
        assert_eq!(outcome, Reconciliation::RebaseTooDeep { depth: 2 });
        assert!(outcome.needs_resync());
        assert_eq!(doc.to_html(), "bB");
    }
}
