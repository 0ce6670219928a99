//! Runtime configuration for a participant.
//!
//! Build-time switches live in Cargo features; everything a host may want to
//! tune per session lives here and can be loaded from JSON.
//!
//! ```rust
//! use stepsync_core::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{"participantId": "alice", "maxRebaseSteps": 64}"#).unwrap();
//! assert_eq!(config.participant_id, "alice");
//! assert_eq!(config.root_tag, "div");
//! assert_eq!(config.max_rebase_steps, Some(64));
//! ```

use crate::error::{Result, SyncError};
use crate::ParticipantId;
use serde::{Deserialize, Serialize};

/// Tag used for the document root when none is configured.
pub const DEFAULT_ROOT_TAG: &str = "div";

/// Per-participant engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Identity of the local participant. Prefixes every step id it mints.
    pub participant_id: ParticipantId,

    /// Tag name of the root element of a fresh document.
    pub root_tag: String,

    /// Upper bound on the number of steps one rebase may revert.
    ///
    /// A rebase that would revert more escalates to resynchronization.
    /// `None` means unbounded.
    pub max_rebase_steps: Option<usize>,
}

impl EngineConfig {
    /// Config for the given participant with defaults elsewhere.
    pub fn new(participant_id: impl Into<ParticipantId>) -> Self {
        Self {
            participant_id: participant_id.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for `max_rebase_steps`.
    pub fn with_max_rebase_steps(mut self, limit: usize) -> Self {
        self.max_rebase_steps = Some(limit);
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that would produce ambiguous ids or an unusable root.
    pub fn validate(&self) -> Result<()> {
        if self.participant_id.is_empty() {
            return Err(SyncError::Config("participant id is empty".to_string()));
        }
        if self
            .participant_id
            .chars()
            .any(|c| matches!(c, '[' | ']' | '{' | '}') || c.is_whitespace())
        {
            return Err(SyncError::Config(format!(
                "participant id {:?} contains marker characters or whitespace",
                self.participant_id
            )));
        }
        if self.root_tag.is_empty() || !self.root_tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SyncError::Config(format!(
                "root tag {:?} is not a plain tag name",
                self.root_tag
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            participant_id: uuid::Uuid::new_v4().simple().to_string(),
            root_tag: DEFAULT_ROOT_TAG.to_string(),
            max_rebase_steps: None,
        }
    }
}
