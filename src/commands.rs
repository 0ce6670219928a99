//! Text commands
//!
//! Mutation producers acting at the local selection. They only touch the
//! tree through an `EditContext`, so everything they do is recorded and
//! ends up in one step.
//!
//! Insertion never edits text to the right of the caret in place: inserting
//! in the middle of a text node keeps the head in the original node and moves
//! the inserted text plus the tail into a new node. Backward delete removes
//! one grapheme cluster and then merges the edited node into a preceding
//! text sibling, which undoes that split.

use crate::error::{Result, SyncError};
use crate::mutation::Anchor;
use crate::selection::SelectionSnapshot;
use crate::sync::EditContext;
use crate::tree::{Document, Oid, SerializedNode};
use unicode_segmentation::UnicodeSegmentation;

/// Insert `text` at the local caret
///
/// A non-collapsed selection inside one text node is deleted first.
///
/// # Example
///
/// ```rust
/// use stepsync_core::{commands, EngineConfig, Participant, RecordingTransport, Snapshot};
///
/// let snapshot = Snapshot::from_markup("<p>ab[c1}{c1]</p>", "div").unwrap();
/// let mut c1 = Participant::from_snapshot(EngineConfig::new("c1"), RecordingTransport::new(), &snapshot).unwrap();
/// c1.edit(|ctx| commands::insert_text(ctx, "cd")).unwrap();
///
/// assert_eq!(c1.render(), "<p>abcd[c1}{c1]</p>");
/// ```
pub fn insert_text(ctx: &mut EditContext<'_>, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    delete_selection(ctx)?;

    let caret = ctx.selection().focus();
    let inserted = text.chars().count();
    let node = ctx.doc().node(&caret.oid)?;

    if let Some(value) = node.text() {
        let value = value.to_string();
        let target = caret.oid.clone();
        let len = value.chars().count();
        let k = caret.offset.min(len);

        if k == len {
            ctx.set_text(&target, format!("{}{}", value, text))?;
            ctx.set_selection(SelectionSnapshot::collapsed(target, k + inserted));
            return Ok(());
        }

        let parent = parent_of(ctx.doc(), &target)?;
        let fresh = ctx.allocate();
        if k == 0 {
            ctx.insert(&parent, Anchor::Before(target), SerializedNode::text(fresh.clone(), text))?;
        } else {
            let split = byte_offset(&value, k);
            ctx.set_text(&target, &value[..split])?;
            let moved = format!("{}{}", text, &value[split..]);
            ctx.insert(&parent, Anchor::After(target), SerializedNode::text(fresh.clone(), moved))?;
        }
        ctx.set_selection(SelectionSnapshot::collapsed(fresh, inserted));
        return Ok(());
    }

    // caret between children of an element
    let index = caret.offset.min(node.children().len());
    let before = index
        .checked_sub(1)
        .and_then(|i| node.children().get(i))
        .cloned();
    if let Some(prev) = &before {
        if let Some(prev_value) = ctx.doc().node(prev)?.text() {
            let prev_len = prev_value.chars().count();
            let extended = format!("{}{}", prev_value, text);
            ctx.set_text(prev, extended)?;
            ctx.set_selection(SelectionSnapshot::collapsed(prev.clone(), prev_len + inserted));
            return Ok(());
        }
    }

    let anchor = match before {
        Some(prev) => Anchor::After(prev),
        None => Anchor::Start,
    };
    let fresh = ctx.allocate();
    ctx.insert(&caret.oid, anchor, SerializedNode::text(fresh.clone(), text))?;
    ctx.set_selection(SelectionSnapshot::collapsed(fresh, inserted));
    Ok(())
}

/// Delete one grapheme cluster before the local caret
///
/// At the start of a text node the last grapheme of a preceding text
/// sibling is deleted instead. At the start of a block nothing happens.
pub fn delete_backward(ctx: &mut EditContext<'_>) -> Result<()> {
    if delete_selection(ctx)? {
        return Ok(());
    }
    let Some((target, k)) = caret_in_text(ctx.doc(), ctx.selection()) else {
        return Ok(());
    };
    let value = ctx.doc().node(&target)?.text().unwrap_or_default().to_string();
    let previous = previous_text(ctx.doc(), &target);

    if k == 0 {
        let Some((prev, prev_value)) = previous else {
            return Ok(());
        };
        let keep = last_grapheme_start(&prev_value, prev_value.len());
        let caret = prev_value[..keep].chars().count();
        ctx.set_text(&prev, format!("{}{}", &prev_value[..keep], value))?;
        ctx.remove(&target)?;
        ctx.set_selection(SelectionSnapshot::collapsed(prev, caret));
        return Ok(());
    }

    let end = byte_offset(&value, k);
    let start = last_grapheme_start(&value, end);
    let edited = format!("{}{}", &value[..start], &value[end..]);
    let caret = value[..start].chars().count();
    ctx.set_text(&target, edited.clone())?;

    match previous {
        Some((prev, prev_value)) => {
            let prev_len = prev_value.chars().count();
            ctx.set_text(&prev, format!("{}{}", prev_value, edited))?;
            ctx.remove(&target)?;
            ctx.set_selection(SelectionSnapshot::collapsed(prev, prev_len + caret));
        }
        None => ctx.set_selection(SelectionSnapshot::collapsed(target, caret)),
    }
    Ok(())
}

/// Delete a range selection lying inside one text node
///
/// Returns whether anything was deleted.
fn delete_selection(ctx: &mut EditContext<'_>) -> Result<bool> {
    let selection = ctx.selection().clone();
    if selection.is_collapsed() || selection.anchor_oid != selection.focus_oid {
        return Ok(false);
    }
    let Some(value) = ctx.doc().node(&selection.anchor_oid)?.text() else {
        return Ok(false);
    };
    let value = value.to_string();
    let len = value.chars().count();
    let start = selection.anchor_offset.min(selection.focus_offset).min(len);
    let end = selection.anchor_offset.max(selection.focus_offset).min(len);

    let (from, to) = (byte_offset(&value, start), byte_offset(&value, end));
    ctx.set_text(&selection.anchor_oid, format!("{}{}", &value[..from], &value[to..]))?;
    ctx.set_selection(SelectionSnapshot::collapsed(selection.anchor_oid, start));
    Ok(true)
}

/// Text node and char offset the caret sits in or right after
fn caret_in_text(doc: &Document, selection: &SelectionSnapshot) -> Option<(Oid, usize)> {
    let focus = selection.focus();
    let node = doc.resolve(&focus.oid)?;
    if node.is_text() {
        return Some((focus.oid, focus.offset.min(node.len())));
    }
    let prev = node.children().get(focus.offset.checked_sub(1)?)?;
    let prev_node = doc.resolve(prev)?;
    prev_node.is_text().then(|| (prev.clone(), prev_node.len()))
}

/// The preceding sibling and its value, when it is a text node
fn previous_text(doc: &Document, oid: &Oid) -> Option<(Oid, String)> {
    let prev = doc.previous_sibling(oid)?;
    Some((prev.oid().clone(), prev.text()?.to_string()))
}

fn parent_of(doc: &Document, oid: &Oid) -> Result<Oid> {
    doc.position_in_parent(oid)
        .map(|(parent, _)| parent.clone())
        .ok_or_else(|| SyncError::NodeNotFound(oid.clone()))
}

/// Byte index of the `chars`-th char (or the end)
fn byte_offset(value: &str, chars: usize) -> usize {
    value
        .char_indices()
        .nth(chars)
        .map(|(byte, _)| byte)
        .unwrap_or(value.len())
}

/// Start of the last grapheme cluster ending at byte `end`
fn last_grapheme_start(value: &str, end: usize) -> usize {
    value[..end]
        .grapheme_indices(true)
        .next_back()
        .map(|(byte, _)| byte)
        .unwrap_or(0)
}
