//! Steps: the immutable, causally linked unit of change
//!
//! A step bundles the mutation records of one user action with the author's
//! selection and a pointer to the step it was authored on top of. That
//! pointer (`previous`) is the only ordering information a step carries.

use crate::error::Result;
use crate::mutation::MutationRecord;
use crate::selection::SelectionSnapshot;
use crate::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the common base step every fresh history starts from
pub const INIT_STEP_ID: &str = "init";

/// Globally unique step identifier
///
/// Ids order lexicographically; concurrent steps sharing a parent are placed
/// in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The shared base step
    pub fn init() -> Self {
        Self(INIT_STEP_ID.to_string())
    }

    /// Fresh id: participant prefix plus a random suffix
    pub fn generate(participant: &str) -> Self {
        Self(format!("{}-{}", participant, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_init(&self) -> bool {
        self.0 == INIT_STEP_ID
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One user action, as broadcast to every participant
///
/// Wire form:
///
/// ```json
/// {"id": "...", "previousStepId": "...", "userId": "...",
///  "cursor": {"anchorNode": "...", "anchorOffset": 0, "focusNode": "...", "focusOffset": 0},
///  "mutations": [{"type": "text", ...}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,

    #[serde(rename = "previousStepId")]
    pub previous: StepId,

    #[serde(rename = "userId")]
    pub author: ParticipantId,

    /// Author's selection right after the action
    #[serde(rename = "cursor")]
    pub selection: SelectionSnapshot,

    pub mutations: Vec<MutationRecord>,
}

impl Step {
    /// Author a new step on top of `previous`
    pub fn new(
        author: ParticipantId,
        previous: StepId,
        selection: SelectionSnapshot,
        mutations: Vec<MutationRecord>,
    ) -> Self {
        Self {
            id: StepId::generate(&author),
            previous,
            author,
            selection,
            mutations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
