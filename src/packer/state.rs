//! The repacking writer (C10).
//!
//! Packing walks the AST and, at every step, consults the presentation map
//! for the node's path: staged prefix comments and blank lines are written
//! first, then the structural token (a mapping key or a sequence dash),
//! then the value — recursing for containers, quoting scalars that would
//! otherwise reclassify on reparse. A node whose path carries include
//! provenance is re-emitted as its original `!include`/`!includeraw` tag
//! plus a reconstructed override block rather than being inlined, so a
//! parse → pack round trip reproduces the source file layout rather than
//! flattening it.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::ast::{Node, NodeKind};
use crate::overrides;
use crate::presentation::{DocumentPresentation, NodePresentation, PathExpr};
use crate::scalar::{classify_bare, Scalar};

/// Flags controlling one pack. `reindent` is reserved for a future
/// normalize-on-write mode; today packing always reproduces the recorded
/// indentation width (2 spaces per level) regardless of the source's own
/// indentation, since the parser does not preserve per-level indent width
/// separately from column numbers. `no_subfiles` tells `pack_tree` to walk
/// the include/override tree (so override reconstruction still runs and
/// any internal errors still surface) without writing any subfile to disk
/// — only the top-level document is emitted to the writer callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackFlags {
    pub reindent: bool,
    pub no_subfiles: bool,
}

/// Maps an include node's path (within the document currently being
/// emitted) to the filename the subfile writer actually claimed for it —
/// which may carry a `~N` dedup suffix (`subfile_writer::SubfileWriter`).
/// `pack`'s standalone callers have no writer and so emit `IncludeInfo`'s
/// recorded path verbatim; `pack_tree` resolves this map bottom-up before
/// emitting so the parent document's `!include` line always names the
/// file that was actually written.
pub(super) type ClaimMap = HashMap<PathExpr, PathBuf>;

/// Render `root` to a single YAML document string, using `presentation` to
/// restore comments, blank lines, flow style, and include/override
/// surface form. Includes are re-emitted as `!include`/`!includeraw` plus
/// their reconstructed override, never inlined.
pub fn pack(root: &Node, presentation: &DocumentPresentation, flags: PackFlags) -> String {
    pack_with_claims(root, presentation, flags, &ClaimMap::new())
}

pub(super) fn pack_with_claims(
    root: &Node,
    presentation: &DocumentPresentation,
    _flags: PackFlags,
    claims: &ClaimMap,
) -> String {
    let mut out = String::new();
    emit_node(&mut out, root, &PathExpr::root(), presentation, claims, 0, true);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn indent_str(depth: usize) -> String {
    "  ".repeat(depth)
}

fn emit_slot_presentation(out: &mut String, presentation: &DocumentPresentation, path: &PathExpr, depth: usize) {
    let Some(p) = presentation.get(path) else {
        return;
    };
    for _ in 0..p.empty_lines {
        out.push('\n');
    }
    for comment in &p.prefix_comments {
        out.push_str(&indent_str(depth));
        out.push('#');
        if !comment.is_empty() {
            out.push(' ');
            out.push_str(comment);
        }
        out.push('\n');
    }
}

fn inline_comment_of<'p>(presentation: &'p DocumentPresentation, path: &PathExpr) -> Option<&'p str> {
    presentation.get(path).and_then(|p: &NodePresentation| p.inline_comment.as_deref())
}

/// Emit `node` at `path`. `at_line_start` tells us whether the caller has
/// already written this slot's key/dash token onto the current line (in
/// which case a container value starts on the *same* line only for flow
/// style or an include tag; block containers always start on a fresh
/// line).
fn emit_node(
    out: &mut String,
    node: &Node,
    path: &PathExpr,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
    depth: usize,
    at_line_start: bool,
) {
    if let Some(np) = presentation.get(path) {
        if let Some(info) = &np.included {
            emit_include(out, node, path, info, presentation, claims, depth, at_line_start);
            return;
        }
    }

    if let Some(tag) = &node.tag {
        if !at_line_start {
            out.push(' ');
        }
        out.push('!');
        out.push_str(&tag.name);
        out.push(' ');
        emit_node_body(out, node, path, presentation, claims, depth, false);
        return;
    }

    emit_node_body(out, node, path, presentation, claims, depth, at_line_start);
}

fn emit_node_body(
    out: &mut String,
    node: &Node,
    path: &PathExpr,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
    depth: usize,
    at_line_start: bool,
) {
    let flow = presentation.get(path).map(|p| p.flow_mode).unwrap_or(false);
    match &node.kind {
        NodeKind::Scalar(s) => {
            if !at_line_start {
                out.push(' ');
            }
            let value_path = path.with_bang();
            let template = presentation.get(&value_path).and_then(|p| p.value_with_variables.as_deref());
            out.push_str(&scalar_text(s, template));
            if let Some(comment) = inline_comment_of(presentation, &value_path) {
                out.push_str(" #");
                if !comment.is_empty() {
                    out.push(' ');
                    out.push_str(comment);
                }
            }
        }
        NodeKind::Sequence(items) => {
            if flow {
                if !at_line_start {
                    out.push(' ');
                }
                emit_flow_sequence(out, items, path, presentation, claims);
            } else {
                emit_block_sequence(out, items, path, presentation, claims, depth);
            }
        }
        NodeKind::Mapping(entries) => {
            if flow {
                if !at_line_start {
                    out.push(' ');
                }
                emit_flow_mapping(out, entries, path, presentation, claims);
            } else {
                emit_block_mapping(out, entries, path, presentation, claims, depth);
            }
        }
    }
}

fn emit_block_sequence(
    out: &mut String,
    items: &[Node],
    path: &PathExpr,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
    depth: usize,
) {
    for (idx, item) in items.iter().enumerate() {
        let elem_path = path.child_index(idx);
        if idx > 0 || !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        emit_slot_presentation(out, presentation, &elem_path, depth);
        out.push_str(&indent_str(depth));
        out.push('-');
        emit_node(out, item, &elem_path, presentation, claims, depth + 1, false);
    }
}

fn emit_block_mapping(
    out: &mut String,
    entries: &[crate::ast::MapEntry],
    path: &PathExpr,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
    depth: usize,
) {
    for (i, entry) in entries.iter().enumerate() {
        let key_path = path.child_key(&entry.key.name);
        if i > 0 || !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        emit_slot_presentation(out, presentation, &key_path, depth);
        out.push_str(&indent_str(depth));
        out.push_str(&entry.key.surface());
        out.push(':');
        let compact_seq = matches!(entry.value.kind, NodeKind::Sequence(_))
            && !presentation.get(&key_path).map(|p| p.flow_mode).unwrap_or(false);
        // A block sequence value is only exempt from the usual "one level
        // deeper than the parent" rule *at the mapping's own column* (the
        // dash sits flush with the key per §4.3's compact-sequence
        // carve-out); the items it contains still indent one level past
        // that, like any other container's children.
        let child_depth = depth + 1;
        if compact_seq {
            out.push('\n');
            emit_node(out, &entry.value, &key_path, presentation, claims, child_depth, true);
        } else {
            emit_node(out, &entry.value, &key_path, presentation, claims, child_depth, false);
        }
    }
}

fn emit_flow_sequence(out: &mut String, items: &[Node], path: &PathExpr, presentation: &DocumentPresentation, claims: &ClaimMap) {
    out.push('[');
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        let elem_path = path.child_index(idx);
        emit_flow_value(out, item, &elem_path, presentation, claims);
    }
    out.push(']');
}

fn emit_flow_mapping(
    out: &mut String,
    entries: &[crate::ast::MapEntry],
    path: &PathExpr,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
) {
    out.push('{');
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let key_path = path.child_key(&entry.key.name);
        out.push_str(&entry.key.surface());
        out.push_str(": ");
        emit_flow_value(out, &entry.value, &key_path, presentation, claims);
    }
    out.push('}');
}

fn emit_flow_value(out: &mut String, node: &Node, path: &PathExpr, presentation: &DocumentPresentation, claims: &ClaimMap) {
    match &node.kind {
        NodeKind::Scalar(s) => {
            let value_path = path.with_bang();
            let template = presentation.get(&value_path).and_then(|p| p.value_with_variables.as_deref());
            out.push_str(&scalar_text(s, template));
        }
        NodeKind::Sequence(items) => emit_flow_sequence(out, items, path, presentation, claims),
        NodeKind::Mapping(entries) => emit_flow_mapping(out, entries, path, presentation, claims),
    }
}

fn emit_include(
    out: &mut String,
    node: &Node,
    path: &PathExpr,
    info: &crate::presentation::IncludeInfo,
    presentation: &DocumentPresentation,
    claims: &ClaimMap,
    depth: usize,
    at_line_start: bool,
) {
    if !at_line_start {
        out.push(' ');
    }
    out.push('!');
    out.push_str(if info.raw { "includeraw" } else { "include" });
    out.push(' ');
    // The dedup writer may have renamed this subfile (`~N` suffix) to
    // avoid clobbering a diverged sibling include of the same nominal
    // path; when it has, the tag must point at the file that was actually
    // written, not the source's original literal.
    let emitted_path = match claims.get(path) {
        Some(claimed) => claimed.to_string_lossy().into_owned(),
        None => info.path.clone(),
    };
    out.push_str(&scalar_text(&Scalar::String(emitted_path), None));

    let mut override_entries: Vec<crate::ast::MapEntry> = info
        .variables_trace
        .iter()
        .map(|b| crate::ast::MapEntry {
            key: crate::ast::MapKey::variable(b.name.clone(), crate::span::Span::synthetic()),
            value: b.value.clone(),
        })
        .collect();
    if let Some(over) = overrides::reconstruct_override_node(node, &info.override_trace) {
        if let Some(entries) = over.as_mapping() {
            override_entries.extend(entries.iter().cloned());
        }
    }
    if !override_entries.is_empty() {
        out.push('\n');
        // The override sits at the same column as the `!include` tag
        // itself (§4.5's `min_indent`), not one level deeper.
        emit_block_mapping(out, &override_entries, path, presentation, claims, depth);
    }
}

fn scalar_text(scalar: &Scalar, template: Option<&str>) -> String {
    if let Some(t) = template {
        return if needs_quoting(t) { quote(t) } else { t.to_string() };
    }
    match scalar {
        Scalar::String(s) => {
            if needs_quoting(s) {
                quote(s)
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

/// A bare lexeme needs quoting if writing it unquoted would either fail to
/// round-trip (`classify_bare` would produce something other than this
/// exact string) or would be misread structurally (leading/trailing
/// space, an embedded `: ` or ` #`, a leading character that starts a
/// different construct, or an empty string).
fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if !matches!(classify_bare(s), Scalar::String(ref t) if t == s) {
        return true;
    }
    if s.starts_with(' ') || s.ends_with(' ') || s.contains('\n') {
        return true;
    }
    if s.contains(": ") || s.ends_with(':') || s.contains(" #") {
        return true;
    }
    matches!(
        s.as_bytes().first(),
        Some(b'!' | b'"' | b'\'' | b'[' | b']' | b'{' | b'}' | b'-' | b'#' | b'&' | b'*' | b'?' | b'|' | b'>' | b'%' | b'@' | b'`')
    )
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x1b' => out.push_str("\\e"),
            '\x0c' => out.push_str("\\f"),
            '\x0b' => out.push_str("\\v"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MapEntry;
    use crate::span::Span;

    fn sp() -> Span {
        Span::synthetic()
    }

    #[test]
    fn packs_flat_scalar_mapping() {
        let root = Node::mapping(
            vec![
                MapEntry {
                    key: crate::ast::MapKey::plain("x", sp()),
                    value: Node::scalar(Scalar::UInt(1), sp()),
                },
                MapEntry {
                    key: crate::ast::MapKey::plain("y", sp()),
                    value: Node::scalar(Scalar::String("hello".to_string()), sp()),
                },
            ],
            sp(),
        );
        let presentation = DocumentPresentation::default();
        let text = pack(&root, &presentation, PackFlags::default());
        assert_eq!(text, "x: 1\ny: hello\n");
    }

    #[test]
    fn quotes_strings_that_would_reclassify() {
        assert!(needs_quoting("true"));
        assert!(needs_quoting("42"));
        assert!(needs_quoting(""));
        assert!(!needs_quoting("hello"));
    }

    #[test]
    fn packs_nested_sequence() {
        let root = Node::sequence(
            vec![
                Node::scalar(Scalar::UInt(1), sp()),
                Node::scalar(Scalar::UInt(2), sp()),
            ],
            sp(),
        );
        let presentation = DocumentPresentation::default();
        let text = pack(&root, &presentation, PackFlags::default());
        assert_eq!(text, "- 1\n- 2\n");
    }

    #[test]
    fn compact_sequence_value_indents_one_level_past_its_key() {
        let root = Node::mapping(
            vec![MapEntry {
                key: crate::ast::MapKey::plain("a", sp()),
                value: Node::sequence(
                    vec![Node::scalar(Scalar::UInt(1), sp()), Node::scalar(Scalar::UInt(2), sp())],
                    sp(),
                ),
            }],
            sp(),
        );
        let presentation = DocumentPresentation::default();
        let text = pack(&root, &presentation, PackFlags::default());
        assert_eq!(text, "a:\n  - 1\n  - 2\n");
    }
}
