//! Selections addressed by oid
//!
//! A participant's cursor is never stored as a flat character index: it is a
//! pair of `(oid, offset)` positions. Text offsets count chars inside a text
//! node; element offsets count children. Because oids survive any amount of
//! history rewriting, a selection snapshot taken before a rebase still means
//! the same thing after it.
//!
//! - `SelectionSnapshot`: what travels inside a step (wire form)
//! - `ResolvedSelection`: what the projector computed against the live tree
//! - `SelectionProjector`: last-known selection of every participant

mod projector;

pub use projector::{resolve, resolve_position, SelectionProjector};

use crate::tree::Oid;
use serde::{Deserialize, Serialize};

/// A point in the tree: a node and an offset inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub oid: Oid,
    pub offset: usize,
}

impl Position {
    pub fn new(oid: Oid, offset: usize) -> Self {
        Self { oid, offset }
    }
}

/// Anchor/focus pair as carried by a step
///
/// Serialized with the wire names `anchorNode`, `anchorOffset`,
/// `focusNode`, `focusOffset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    #[serde(rename = "anchorNode")]
    pub anchor_oid: Oid,
    pub anchor_offset: usize,
    #[serde(rename = "focusNode")]
    pub focus_oid: Oid,
    pub focus_offset: usize,
}

impl SelectionSnapshot {
    /// A selection spanning two positions
    pub fn new(anchor: Position, focus: Position) -> Self {
        Self {
            anchor_oid: anchor.oid,
            anchor_offset: anchor.offset,
            focus_oid: focus.oid,
            focus_offset: focus.offset,
        }
    }

    /// A caret
    pub fn collapsed(oid: Oid, offset: usize) -> Self {
        Self {
            anchor_oid: oid.clone(),
            anchor_offset: offset,
            focus_oid: oid,
            focus_offset: offset,
        }
    }

    pub fn anchor(&self) -> Position {
        Position::new(self.anchor_oid.clone(), self.anchor_offset)
    }

    pub fn focus(&self) -> Position {
        Position::new(self.focus_oid.clone(), self.focus_offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor_oid == self.focus_oid && self.anchor_offset == self.focus_offset
    }
}

/// A selection resolved against the live tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub anchor: Position,
    pub focus: Position,
    /// Whether either end fell back to a surviving ancestor
    pub degraded: bool,
}

impl ResolvedSelection {
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}
