//! Snapshots: full tree state at a known step
//!
//! Used to bootstrap a new participant and to recover after divergence. A
//! snapshot supersedes history: whoever resets from it starts a fresh history
//! whose base is `step_id`.

use super::step::StepId;
use crate::error::Result;
use crate::selection::SelectionSnapshot;
use crate::tree::{markup, SerializedNode};
use crate::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized tree plus the step it was taken at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub step_id: StepId,
    pub root: SerializedNode,
    /// Last-known selections of every participant
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selections: BTreeMap<ParticipantId, SelectionSnapshot>,
}

impl Snapshot {
    pub fn new(step_id: StepId, root: SerializedNode) -> Self {
        Self {
            step_id,
            root,
            selections: BTreeMap::new(),
        }
    }

    /// Snapshot at the base step built from a markup fixture
    ///
    /// ```rust
    /// use stepsync_core::Snapshot;
    ///
    /// let snapshot = Snapshot::from_markup("<p>ab[c1}{c1]</p>", "div").unwrap();
    /// assert!(snapshot.step_id.is_init());
    /// assert!(snapshot.selections.contains_key("c1"));
    /// ```
    pub fn from_markup(input: &str, root_tag: &str) -> Result<Self> {
        let parsed = markup::parse(input, root_tag)?;
        Ok(Self {
            step_id: StepId::init(),
            root: parsed.root,
            selections: parsed.selections,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
