//! Participant: one collaborator's engine instance
//!
//! Owns the live `Document`, the `StepStore`, the `SelectionProjector` and a
//! `Transport`. Everything is single-threaded; every public method runs to
//! completion before the next one starts.
//!
//! # Resynchronization state
//!
//! ```text
//! +-------------+  unknown ancestor / divergence   +-----------------+
//! | Reconciling | -------------------------------> | Resync pending  |
//! |             | <------------------------------- | (steps dropped) |
//! +-------------+        reset_and_sync            +-----------------+
//! ```
//!
//! While a resynchronization is pending, incoming steps are dropped and no
//! further requests are issued. Local editing stays available.

use super::reconciler::{Reconciler, Reconciliation};
use super::transport::Transport;
use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::history::{Snapshot, Step, StepId, StepStore};
use crate::mutation::{Anchor, MutationRecord};
use crate::selection::{ResolvedSelection, SelectionProjector, SelectionSnapshot};
use crate::tree::{markup, Document, Oid, SerializedNode};
use crate::ParticipantId;
use std::collections::BTreeMap;

/// Handle given to an edit closure: the tree plus the local selection
///
/// Every change made through it is observed and ends up in the step the
/// edit produces.
pub struct EditContext<'a> {
    doc: &'a mut Document,
    selection: SelectionSnapshot,
}

impl<'a> EditContext<'a> {
    pub fn doc(&self) -> &Document {
        self.doc
    }

    pub fn selection(&self) -> &SelectionSnapshot {
        &self.selection
    }

    /// Where the local selection should be once the edit is done
    pub fn set_selection(&mut self, selection: SelectionSnapshot) {
        self.selection = selection;
    }

    pub fn allocate(&mut self) -> Oid {
        self.doc.allocate()
    }

    pub fn insert(&mut self, parent: &Oid, anchor: Anchor, node: SerializedNode) -> Result<()> {
        self.doc.insert(parent, anchor, node)
    }

    pub fn remove(&mut self, oid: &Oid) -> Result<()> {
        self.doc.remove(oid)
    }

    pub fn set_text(&mut self, oid: &Oid, value: impl Into<String>) -> Result<()> {
        self.doc.set_text(oid, value)
    }

    pub fn set_attribute(&mut self, oid: &Oid, name: &str, value: Option<String>) -> Result<()> {
        self.doc.set_attribute(oid, name, value)
    }
}

/// One participant in a collaborative session
pub struct Participant<T: Transport> {
    config: EngineConfig,
    doc: Document,
    store: StepStore,
    projector: SelectionProjector,
    reconciler: Reconciler,
    transport: T,
    resync_pending: bool,
    /// Own steps eligible for undo, oldest first
    undo_stack: Vec<StepId>,
}

impl<T: Transport> Participant<T> {
    /// Fresh participant holding an empty document at the base step
    pub fn new(config: EngineConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let doc = Document::new(config.participant_id.clone(), &config.root_tag);
        let projector = SelectionProjector::new(config.participant_id.clone());
        let reconciler = Reconciler::new(config.max_rebase_steps);
        Ok(Self {
            config,
            doc,
            store: StepStore::default(),
            projector,
            reconciler,
            transport,
            resync_pending: false,
            undo_stack: Vec::new(),
        })
    }

    /// Participant bootstrapped from a snapshot
    pub fn from_snapshot(config: EngineConfig, transport: T, snapshot: &Snapshot) -> Result<Self> {
        let mut participant = Self::new(config, transport)?;
        participant.reset_and_sync(snapshot)?;
        Ok(participant)
    }

    pub fn id(&self) -> &ParticipantId {
        &self.config.participant_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn history(&self) -> &StepStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_resync_pending(&self) -> bool {
        self.resync_pending
    }

    // --- selections ---

    /// The local selection projected onto the live tree
    pub fn selection(&self) -> SelectionSnapshot {
        match self.projector.project(&self.doc, self.id()) {
            Some(resolved) => SelectionSnapshot::new(resolved.anchor, resolved.focus),
            None => SelectionSnapshot::collapsed(Oid::root(), 0),
        }
    }

    /// Move the local selection without editing
    pub fn set_selection(&mut self, selection: SelectionSnapshot) {
        self.projector.update(self.config.participant_id.clone(), selection);
    }

    /// Any participant's selection projected onto the live tree
    pub fn selection_of(&self, participant: &str) -> Option<ResolvedSelection> {
        self.projector.project(&self.doc, participant)
    }

    /// Every known selection projected onto the live tree
    pub fn selections(&self) -> BTreeMap<ParticipantId, ResolvedSelection> {
        self.projector.project_all(&self.doc)
    }

    /// Drop a departed participant's selection
    pub fn forget_participant(&mut self, participant: &str) -> bool {
        let forgotten = self.projector.forget(participant).is_some();
        if forgotten {
            tracing::debug!(participant, "participant forgotten");
        }
        forgotten
    }

    /// Content with every known selection drawn in as markers
    pub fn render(&self) -> String {
        markup::render(&self.doc, &self.selections())
    }

    // --- local edits ---

    /// Run one user action and turn its mutations into one step
    ///
    /// Returns the new step id, or `None` when the action changed nothing.
    /// If `f` fails, its mutations are rolled back and no step is produced.
    pub fn edit<F>(&mut self, f: F) -> Result<Option<StepId>>
    where
        F: FnOnce(&mut EditContext<'_>) -> Result<()>,
    {
        let selection = self.selection();
        let mut ctx = EditContext {
            doc: &mut self.doc,
            selection,
        };
        let outcome = f(&mut ctx);
        let selection = ctx.selection;

        let (forward, inverse) = self.doc.recorder_mut().take();
        if let Err(err) = outcome {
            if let Err(rollback) = self.doc.unobserved(|doc| doc.revert(&inverse)) {
                tracing::error!(%rollback, "failed to roll back an aborted edit");
            }
            return Err(err);
        }

        self.set_selection(selection.clone());
        if forward.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.commit(selection, forward, inverse)))
    }

    /// Author a new step that undoes this participant's latest own step
    ///
    /// Fails without changing anything if concurrent edits made the inverse
    /// inapplicable.
    pub fn undo(&mut self) -> Result<StepId> {
        while let Some(target) = self.undo_stack.pop() {
            let Some(inverse) = self.store.inverse_of(&target) else {
                continue;
            };
            let records: Vec<MutationRecord> = inverse.iter().rev().cloned().collect();
            match self.doc.unobserved(|doc| doc.apply(&records)) {
                Ok(undo_inverse) => {
                    let selection = self.selection();
                    let id = self.commit_unstacked(selection, records, undo_inverse);
                    tracing::debug!(undone = %target, step = %id, "undo step authored");
                    return Ok(id);
                }
                Err(err) => {
                    self.undo_stack.push(target);
                    return Err(err);
                }
            }
        }
        Err(SyncError::NothingToUndo)
    }

    fn commit(&mut self, selection: SelectionSnapshot, forward: Vec<MutationRecord>, inverse: Vec<MutationRecord>) -> StepId {
        let id = self.commit_unstacked(selection, forward, inverse);
        self.undo_stack.push(id.clone());
        id
    }

    fn commit_unstacked(
        &mut self,
        selection: SelectionSnapshot,
        forward: Vec<MutationRecord>,
        inverse: Vec<MutationRecord>,
    ) -> StepId {
        let step = Step::new(self.id().clone(), self.store.tip().clone(), selection, forward);
        let id = step.id.clone();
        self.transport.send_step(&step);
        self.store.append(step, inverse);
        tracing::debug!(step = %id, participant = %self.config.participant_id, "local step committed");
        id
    }

    // --- remote steps ---

    /// Reconcile a step received from another participant
    ///
    /// Order tolerant: steps can arrive in any order consistent with each
    /// author's own sequence. Missing ancestors escalate to a single
    /// resynchronization request.
    pub fn on_incoming_step(&mut self, step: Step) -> Reconciliation {
        if self.resync_pending {
            tracing::debug!(step = %step.id, "resync pending, step dropped");
            return Reconciliation::Dropped;
        }

        let author = step.author.clone();
        let selection = step.selection.clone();
        let outcome = match self.reconciler.execute(&mut self.store, &mut self.doc, step) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%err, participant = %self.config.participant_id, "divergence while reconciling");
                Reconciliation::Diverged
            }
        };

        if outcome.is_applied() && author != self.config.participant_id {
            self.projector.update(author, selection);
        }
        if outcome.needs_resync() {
            self.request_resync();
        }
        outcome
    }

    /// Parse and reconcile a step in wire form
    pub fn on_incoming_json(&mut self, json: &str) -> Result<Reconciliation> {
        let step = Step::from_json(json)?;
        Ok(self.on_incoming_step(step))
    }

    fn request_resync(&mut self) {
        if self.resync_pending {
            return;
        }
        self.resync_pending = true;
        tracing::warn!(participant = %self.config.participant_id, tip = %self.store.tip(), "requesting resynchronization");
        self.transport.request_resynchronization();
    }

    // --- snapshots ---

    /// Full state at the current tip, with every projected selection
    pub fn get_snapshot(&self) -> Snapshot {
        let selections = self
            .selections()
            .into_iter()
            .map(|(participant, resolved)| (participant, SelectionSnapshot::new(resolved.anchor, resolved.focus)))
            .collect();
        self.store.get_snapshot(&self.doc, selections)
    }

    /// Replace tree, history and selections with a snapshot
    ///
    /// Clears any pending resynchronization. On error nothing changes.
    pub fn reset_and_sync(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.store.reset_and_sync(&mut self.doc, snapshot)?;
        self.projector.replace_all(snapshot.selections.clone());
        self.undo_stack.clear();
        self.resync_pending = false;
        tracing::info!(participant = %self.config.participant_id, base = %snapshot.step_id, "reset from snapshot");
        Ok(())
    }
}
