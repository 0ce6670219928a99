//! HTML-like markup with inline selection markers
//!
//! Documents and carets are written as one string, e.g.
//! `<p>ab[c1}{c1]c</p>`:
//!
//! - `[id}` marks the anchor of participant `id`
//! - `{id]` marks the focus of participant `id`
//!
//! Markers do not split text, so `ab[c1}{c1]c` is a single text node with
//! participant `c1`'s caret at offset 2. A marker between elements resolves to
//! `(element, child index)`.
//!
//! Rendering is the exact reverse: markers are emitted at their offsets, with
//! participants sorted by id and each anchor before its focus when both fall
//! on the same spot. The root element itself is never rendered.

use super::{Document, NodeContent, Oid, SerializedNode};
use crate::error::{Result, SyncError};
use crate::selection::{Position, ResolvedSelection, SelectionSnapshot};
use crate::ParticipantId;
use std::collections::{BTreeMap, HashMap};

/// Elements that never have children or a closing tag
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input"];

/// A parsed fixture: a serialized root plus every participant's selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarkup {
    pub root: SerializedNode,
    pub selections: BTreeMap<ParticipantId, SelectionSnapshot>,
}

/// Parse markup into a root element of type `root_tag`
///
/// Oids are assigned in document order as `n1`, `n2`, ...; the root gets the
/// fixed root oid. Parsing the same string twice yields identical trees.
///
/// # Example
///
/// ```rust
/// use stepsync_core::tree::markup;
///
/// let parsed = markup::parse("<p>ab[c1}{c1]c</p>", "div").unwrap();
/// let caret = &parsed.selections["c1"];
/// assert_eq!(caret.anchor_offset, 2);
/// assert!(caret.is_collapsed());
/// ```
pub fn parse(input: &str, root_tag: &str) -> Result<ParsedMarkup> {
    let mut issued = 0u64;
    parse_with(input, root_tag, || {
        issued += 1;
        Oid::new(format!("n{}", issued))
    })
}

/// Parse markup, minting oids with `allocate`
pub fn parse_with(input: &str, root_tag: &str, allocate: impl FnMut() -> Oid) -> Result<ParsedMarkup> {
    Parser::new(input, root_tag, allocate).run()
}

#[derive(Default)]
struct Marks {
    anchor: Option<Position>,
    focus: Option<Position>,
}

struct Parser<'a, F> {
    input: &'a str,
    pos: usize,
    allocate: F,
    stack: Vec<SerializedNode>,
    text: Option<(Oid, String)>,
    marks: BTreeMap<ParticipantId, Marks>,
}

impl<'a, F: FnMut() -> Oid> Parser<'a, F> {
    fn new(input: &'a str, root_tag: &str, allocate: F) -> Self {
        Self {
            input,
            pos: 0,
            allocate,
            stack: vec![SerializedNode::element(Oid::root(), root_tag)],
            text: None,
            marks: BTreeMap::new(),
        }
    }

    fn run(mut self) -> Result<ParsedMarkup> {
        while let Some(ch) = self.peek() {
            match ch {
                '<' => self.tag()?,
                '[' | '{' if self.marker()? => {}
                '&' => {
                    let decoded = self.entity();
                    self.push_char(decoded);
                }
                _ => {
                    self.pos += ch.len_utf8();
                    self.push_char(ch);
                }
            }
        }
        self.flush_text();

        if self.stack.len() > 1 {
            let tag = self
                .stack
                .last()
                .and_then(|node| match &node.content {
                    NodeContent::Element { tag, .. } => Some(tag.clone()),
                    NodeContent::Text { .. } => None,
                })
                .unwrap_or_default();
            return Err(self.error(format!("unclosed <{}>", tag)));
        }
        let root = self
            .stack
            .pop()
            .ok_or_else(|| self.error("missing root".to_string()))?;

        let mut selections = BTreeMap::new();
        for (participant, marks) in self.marks {
            let (anchor, focus) = match (marks.anchor, marks.focus) {
                (Some(anchor), Some(focus)) => (anchor, focus),
                (Some(only), None) | (None, Some(only)) => (only.clone(), only),
                (None, None) => continue,
            };
            selections.insert(participant, SelectionSnapshot::new(anchor, focus));
        }
        Ok(ParsedMarkup { root, selections })
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: String) -> SyncError {
        SyncError::Markup {
            offset: self.pos,
            message,
        }
    }

    fn push_char(&mut self, ch: char) {
        match &mut self.text {
            Some((_, value)) => value.push(ch),
            None => {
                let oid = (self.allocate)();
                self.text = Some((oid, ch.to_string()));
            }
        }
    }

    fn flush_text(&mut self) {
        if let Some((oid, value)) = self.text.take() {
            if let Some(parent) = self.stack.last_mut() {
                parent.children.push(SerializedNode::text(oid, value));
            }
        }
    }

    fn here(&self) -> Position {
        match (&self.text, self.stack.last()) {
            (Some((oid, value)), _) => Position::new(oid.clone(), value.chars().count()),
            (None, Some(parent)) => Position::new(parent.oid.clone(), parent.children.len()),
            (None, None) => Position::new(Oid::root(), 0),
        }
    }

    /// Try to read `[id}` or `{id]`; leaves the input untouched when the
    /// brackets do not form a marker
    fn marker(&mut self) -> Result<bool> {
        let rest = self.rest();
        let (open, close) = if rest.starts_with('[') { ('[', '}') } else { ('{', ']') };
        let body = &rest[open.len_utf8()..];
        let Some(end) = body.find(|c: char| matches!(c, '[' | ']' | '{' | '}' | '<' | '>') || c.is_whitespace())
        else {
            return Ok(false);
        };
        if end == 0 || !body[end..].starts_with(close) {
            return Ok(false);
        }

        let participant = body[..end].to_string();
        let position = self.here();
        let offset = self.pos;
        let is_anchor = open == '[';
        let marks = self.marks.entry(participant.clone()).or_default();
        let slot = if is_anchor { &mut marks.anchor } else { &mut marks.focus };
        if slot.is_some() {
            let which = if is_anchor { "anchor" } else { "focus" };
            return Err(SyncError::Markup {
                offset,
                message: format!("second {} marker for {}", which, participant),
            });
        }
        *slot = Some(position);
        self.pos += open.len_utf8() + end + close.len_utf8();
        Ok(true)
    }

    fn entity(&mut self) -> char {
        let rest = self.rest();
        let table = [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'), ("&quot;", '"')];
        for (name, ch) in table {
            if rest.starts_with(name) {
                self.pos += name.len();
                return ch;
            }
        }
        self.pos += 1;
        '&'
    }

    fn tag(&mut self) -> Result<()> {
        self.flush_text();
        let rest = self.rest();
        let end = rest
            .find('>')
            .ok_or_else(|| self.error("unterminated tag".to_string()))?;
        let inner = &rest[1..end];
        let start = self.pos;
        self.pos += end + 1;

        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim();
            let open = self
                .stack
                .pop()
                .ok_or_else(|| self.error("unbalanced closing tag".to_string()))?;
            let matches = matches!(&open.content, NodeContent::Element { tag, .. } if tag == name);
            if !matches || self.stack.is_empty() {
                return Err(SyncError::Markup {
                    offset: start,
                    message: format!("unexpected </{}>", name),
                });
            }
            if let Some(parent) = self.stack.last_mut() {
                parent.children.push(open);
            }
            return Ok(());
        }

        let (inner, self_closing) = match inner.strip_suffix('/') {
            Some(trimmed) => (trimmed, true),
            None => (inner, false),
        };
        let (name, attributes) = parse_tag_body(inner).map_err(|message| SyncError::Markup { offset: start, message })?;
        let void = self_closing || VOID_TAGS.contains(&name.as_str());

        let mut node = SerializedNode::element((self.allocate)(), name);
        for (key, value) in attributes {
            node = node.with_attribute(key, value);
        }
        if void {
            if let Some(parent) = self.stack.last_mut() {
                parent.children.push(node);
            }
        } else {
            self.stack.push(node);
        }
        Ok(())
    }
}

fn parse_tag_body(body: &str) -> std::result::Result<(String, Vec<(String, String)>), String> {
    let body = body.trim();
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("bad tag name {:?}", name));
    }

    let mut attributes = Vec::new();
    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| format!("attribute without value in {:?}", body))?;
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let after = after
            .strip_prefix('"')
            .ok_or_else(|| format!("unquoted attribute {:?}", key))?;
        let close = after.find('"').ok_or_else(|| format!("unterminated attribute {:?}", key))?;
        attributes.push((key, unescape(&after[..close])));
        rest = after[close + 1..].trim_start();
    }
    Ok((name.to_string(), attributes))
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn escape_into(out: &mut String, ch: char, in_attribute: bool) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' if in_attribute => out.push_str("&quot;"),
        _ => out.push(ch),
    }
}

/// Render the document with the given selections drawn in
pub fn render(doc: &Document, selections: &BTreeMap<ParticipantId, ResolvedSelection>) -> String {
    let mut markers: HashMap<(&Oid, usize), String> = HashMap::new();
    for (participant, selection) in selections {
        markers
            .entry((&selection.anchor.oid, selection.anchor.offset))
            .or_default()
            .push_str(&format!("[{}}}", participant));
        markers
            .entry((&selection.focus.oid, selection.focus.offset))
            .or_default()
            .push_str(&format!("{{{}]", participant));
    }

    let mut out = String::new();
    if let Some(root) = doc.resolve(&Oid::root()) {
        render_children(doc, root.oid(), root.children(), &markers, &mut out);
    }
    out
}

fn render_children(
    doc: &Document,
    parent: &Oid,
    children: &[Oid],
    markers: &HashMap<(&Oid, usize), String>,
    out: &mut String,
) {
    for (index, child) in children.iter().enumerate() {
        if let Some(marks) = markers.get(&(parent, index)) {
            out.push_str(marks);
        }
        if let Some(node) = doc.resolve(child) {
            render_node(doc, node, markers, out);
        }
    }
    if let Some(marks) = markers.get(&(parent, children.len())) {
        out.push_str(marks);
    }
}

fn render_node(doc: &Document, node: &super::Node, markers: &HashMap<(&Oid, usize), String>, out: &mut String) {
    match node.content() {
        NodeContent::Text { value } => {
            let mut count = 0;
            for (offset, ch) in value.chars().enumerate() {
                if let Some(marks) = markers.get(&(node.oid(), offset)) {
                    out.push_str(marks);
                }
                escape_into(out, ch, false);
                count = offset + 1;
            }
            if let Some(marks) = markers.get(&(node.oid(), count)) {
                out.push_str(marks);
            }
        }
        NodeContent::Element { tag, attributes } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                for ch in value.chars() {
                    escape_into(out, ch, true);
                }
                out.push('"');
            }
            out.push('>');
            if VOID_TAGS.contains(&tag.as_str()) && node.children().is_empty() {
                return;
            }
            render_children(doc, node.oid(), node.children(), markers, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(snapshot: &SelectionSnapshot) -> ResolvedSelection {
        ResolvedSelection {
            anchor: snapshot.anchor(),
            focus: snapshot.focus(),
            degraded: false,
        }
    }

    fn roundtrip(input: &str) -> String {
        let parsed = parse(input, "div").unwrap();
        let doc = Document::from_serialized("t".to_string(), &parsed.root).unwrap();
        let selections = parsed
            .selections
            .iter()
            .map(|(id, sel)| (id.clone(), resolved(sel)))
            .collect();
        render(&doc, &selections)
    }

    #[test]
    fn test_markers_do_not_split_text() {
        let parsed = parse("ab[c1}{c1]c", "div").unwrap();
        assert_eq!(parsed.root.children.len(), 1);
        assert_eq!(parsed.root.children[0].content, NodeContent::text("abc"));

        let sel = &parsed.selections["c1"];
        assert_eq!(sel.anchor_oid, parsed.root.children[0].oid);
        assert_eq!(sel.anchor_offset, 2);
    }

    #[test]
    fn test_marker_between_elements() {
        let parsed = parse("<p>a</p>[c1}{c1]<p>b</p>", "div").unwrap();
        let sel = &parsed.selections["c1"];
        assert!(sel.anchor_oid.is_root());
        assert_eq!(sel.anchor_offset, 1);
    }

    #[test]
    fn test_range_selection() {
        let parsed = parse("<p>a[c1}bc{c1]d</p>", "div").unwrap();
        let sel = &parsed.selections["c1"];
        assert_eq!((sel.anchor_offset, sel.focus_offset), (1, 3));
    }

    #[test]
    fn test_roundtrip() {
        for input in [
            "ab[c1}{c1][c2}{c2]c",
            "<p>abe</p><p>cdf</p>",
            "<p class=\"x\">a[c1}b</p><p>c{c1]</p>",
            "<p>a<br>b</p>",
            "[c1}{c1]",
            "1 &lt; 2 &amp;&amp; 3 &gt; 2",
        ] {
            assert_eq!(roundtrip(input), input);
        }
    }

    #[test]
    fn test_render_sorts_participants() {
        assert_eq!(roundtrip("a[c2}{c2]b"), "a[c2}{c2]b");
        let parsed = parse("a[c2}[c1}{c1]{c2]b", "div").unwrap();
        let doc = Document::from_serialized("t".to_string(), &parsed.root).unwrap();
        let selections = parsed
            .selections
            .iter()
            .map(|(id, sel)| (id.clone(), resolved(sel)))
            .collect();
        assert_eq!(render(&doc, &selections), "a[c1}{c1][c2}{c2]b");
    }

    #[test]
    fn test_self_closing() {
        let parsed = parse("<p/>x", "div").unwrap();
        assert_eq!(parsed.root.children.len(), 2);
        assert!(parsed.root.children[0].children.is_empty());
    }

    #[test]
    fn test_stray_brackets_are_text() {
        let parsed = parse("a[b c]", "div").unwrap();
        assert!(parsed.selections.is_empty());
        assert_eq!(parsed.root.children[0].content, NodeContent::text("a[b c]"));
    }

    #[test]
    fn test_unclosed_tag() {
        let err = parse("<p>abc", "div").unwrap_err();
        assert!(matches!(err, SyncError::Markup { .. }));
    }

    #[test]
    fn test_mismatched_close() {
        assert!(parse("<p>abc</b>", "div").is_err());
        assert!(parse("</p>", "div").is_err());
    }

    #[test]
    fn test_duplicate_marker() {
        assert!(parse("[c1}a[c1}", "div").is_err());
    }

    #[test]
    fn test_deterministic_oids() {
        let a = parse("<p>x</p><p>y</p>", "div").unwrap();
        let b = parse("<p>x</p><p>y</p>", "div").unwrap();
        assert_eq!(a, b);
    }
}
