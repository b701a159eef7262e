//! The override merge algebra (C9).
//!
//! An override is the trailing mapping that follows an `!include` tag.
//! Its `$name:` keys feed the variable engine (`variables::bind`); every
//! other key is merged into the included AST by [`apply_override`]
//! following the type-directed rules of §4.7:
//!
//! - scalar + scalar → replace, remembering the original for round-trip
//! - sequence + sequence → append-only
//! - mapping + mapping → recurse by key, appending unmatched keys
//! - anything else → `InvalidOverride`
//!
//! Every mutation is also recorded into an [`OverrideTrace`] in the surface
//! order the override mapping was written, which is what lets the packer
//! regenerate the override block later by walking the trace instead of
//! diffing two trees.

use crate::ast::{MapEntry, Node, NodeKind};
use crate::error::{ErrorKind, YamlError};
use crate::presentation::{OverrideTrace, PathExpr};

/// Merge `over` into `included` in place, relative to `path`, recording
/// every mutation into `trace`.
pub fn apply_override(
    included: &mut Node,
    over: &Node,
    path: PathExpr,
    trace: &mut OverrideTrace,
) -> Result<(), YamlError> {
    match (&mut included.kind, &over.kind) {
        (NodeKind::Scalar(_), NodeKind::Scalar(_)) => {
            let original = included.clone();
            *included = over.clone();
            trace.push(path.with_bang(), Some(original));
            Ok(())
        }
        (NodeKind::Sequence(items), NodeKind::Sequence(extra)) => {
            for item in extra {
                let idx = items.len();
                items.push(item.clone());
                trace.push(path.child_index(idx), None);
            }
            Ok(())
        }
        (NodeKind::Mapping(entries), NodeKind::Mapping(over_entries)) => {
            for over_entry in over_entries {
                if over_entry.key.is_variable {
                    // Variable bindings are handled by the variable engine,
                    // not the override merge.
                    continue;
                }
                let key_path = path.child_key(&over_entry.key.name);
                if let Some(existing) = entries
                    .iter_mut()
                    .find(|e| e.key.name == over_entry.key.name)
                {
                    apply_override(&mut existing.value, &over_entry.value, key_path, trace)?;
                } else {
                    entries.push(MapEntry {
                        key: over_entry.key.clone(),
                        value: over_entry.value.clone(),
                    });
                    trace.push(key_path, None);
                }
            }
            Ok(())
        }
        (_, _) => Err(YamlError::new(
            ErrorKind::InvalidOverride(format!(
                "cannot override a {} with a {}",
                included.kind_name(),
                over.kind_name()
            )),
            over.span,
        )),
    }
}

/// Split a trailing override mapping into `(variable bindings, plain
/// override material)`, per §4.5/§4.6: a `$name:` key is a variable
/// binding; everything else is override material for `apply_override`.
pub fn split_variable_bindings(over: &Node) -> (Vec<(&str, &Node)>, Node) {
    let Some(entries) = over.as_mapping() else {
        return (Vec::new(), over.clone());
    };
    let mut bindings = Vec::new();
    let mut plain = Vec::new();
    for entry in entries {
        if entry.key.is_variable {
            bindings.push((entry.key.name.as_str(), &entry.value));
        } else {
            plain.push(entry.clone());
        }
    }
    (bindings, Node::mapping(plain, over.span))
}

/// Flip `found` on every trace entry whose path still resolves against
/// `root`. Call before serializing a trace (e.g. into the JSON
/// presentation envelope) if downstream tooling wants to see which
/// override sites survived to this repack; `reconstruct_override_node`
/// itself doesn't need this; it re-derives "found" on the fly by calling
/// `navigate` directly.
pub fn mark_found(root: &Node, trace: &mut OverrideTrace) {
    for path in trace.ordered_paths.clone() {
        let found = root.navigate(&path.segments).is_some();
        if let Some(entry) = trace.entries.get_mut(&path) {
            entry.found = found;
        }
    }
}

/// Regenerate the surface override mapping from a trace by reading each
/// referenced path's *current* value out of the (already overridden) AST.
/// Trace entries whose `found` flag is `false` are omitted: they indicate
/// the override mutated the AST in a way that makes the original site no
/// longer resolvable (e.g. the overridden key was since removed).
pub fn reconstruct_override_node(root: &Node, trace: &OverrideTrace) -> Option<Node> {
    if trace.ordered_paths.is_empty() {
        return None;
    }
    let mut out = Node::mapping(Vec::new(), root.span);
    for path in &trace.ordered_paths {
        let lookup_segments: Vec<_> = path.segments.clone();
        let Some(value) = root.navigate(&lookup_segments) else {
            continue;
        };
        graft(&mut out, &path.segments, value.clone());
    }
    Some(out)
}

/// Graft `value` into the skeleton rooted at `out`, creating intermediate
/// mapping/sequence nodes as needed to reach `segments`.
fn graft(out: &mut Node, segments: &[crate::presentation::Segment], value: Node) {
    use crate::presentation::Segment;
    use crate::span::Span;

    if segments.is_empty() {
        *out = value;
        return;
    }
    match &segments[0] {
        Segment::Key(key) => {
            if out.as_mapping().is_none() {
                out.kind = NodeKind::Mapping(Vec::new());
            }
            let entries = out.as_mapping_mut().unwrap();
            if let Some(entry) = entries.iter_mut().find(|e| &e.key.name == key) {
                graft(&mut entry.value, &segments[1..], value);
            } else {
                let mut child = Node::null(Span::synthetic());
                graft(&mut child, &segments[1..], value);
                entries.push(MapEntry {
                    key: crate::ast::MapKey::plain(key.clone(), Span::synthetic()),
                    value: child,
                });
            }
        }
        Segment::Index(idx) => {
            if out.as_sequence().is_none() {
                out.kind = NodeKind::Sequence(Vec::new());
            }
            let items = out.as_sequence_mut().unwrap();
            while items.len() <= *idx {
                items.push(Node::null(Span::synthetic()));
            }
            graft(&mut items[*idx], &segments[1..], value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MapKey;
    use crate::scalar::Scalar;
    use crate::span::Span;

    fn sp() -> Span {
        Span::synthetic()
    }

    fn scalar_entry(key: &str, v: Scalar) -> MapEntry {
        MapEntry {
            key: MapKey::plain(key, sp()),
            value: Node::scalar(v, sp()),
        }
    }

    #[test]
    fn scalar_replace_records_original() {
        let mut included = Node::scalar(Scalar::UInt(1), sp());
        let over = Node::scalar(Scalar::UInt(3), sp());
        let mut trace = OverrideTrace::default();
        apply_override(&mut included, &over, PathExpr::root().child_key("y"), &mut trace).unwrap();
        assert_eq!(included.kind, NodeKind::Scalar(Scalar::UInt(3)));
        let entry = &trace.entries[&PathExpr::root().child_key("y").with_bang()];
        assert_eq!(entry.original_data, Some(Node::scalar(Scalar::UInt(1), sp())));
    }

    #[test]
    fn sequence_merge_is_append_only() {
        let mut included = Node::sequence(vec![Node::scalar(Scalar::UInt(1), sp())], sp());
        let over = Node::sequence(vec![Node::scalar(Scalar::UInt(2), sp())], sp());
        let mut trace = OverrideTrace::default();
        apply_override(&mut included, &over, PathExpr::root(), &mut trace).unwrap();
        let items = included.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, NodeKind::Scalar(Scalar::UInt(1)));
        assert_eq!(items[1].kind, NodeKind::Scalar(Scalar::UInt(2)));
    }

    #[test]
    fn mapping_merge_appends_new_keys_and_recurses() {
        let mut included = Node::mapping(
            vec![scalar_entry("x", Scalar::UInt(1)), scalar_entry("y", Scalar::UInt(2))],
            sp(),
        );
        let over = Node::mapping(
            vec![scalar_entry("y", Scalar::UInt(3)), scalar_entry("z", Scalar::UInt(4))],
            sp(),
        );
        let mut trace = OverrideTrace::default();
        apply_override(&mut included, &over, PathExpr::root(), &mut trace).unwrap();
        assert_eq!(included.get("x").unwrap().kind, NodeKind::Scalar(Scalar::UInt(1)));
        assert_eq!(included.get("y").unwrap().kind, NodeKind::Scalar(Scalar::UInt(3)));
        assert_eq!(included.get("z").unwrap().kind, NodeKind::Scalar(Scalar::UInt(4)));
    }

    #[test]
    fn type_mismatch_is_invalid_override() {
        let mut included = Node::scalar(Scalar::UInt(1), sp());
        let over = Node::sequence(vec![], sp());
        let mut trace = OverrideTrace::default();
        assert!(apply_override(&mut included, &over, PathExpr::root(), &mut trace).is_err());
    }

    #[test]
    fn reconstruct_rebuilds_skeleton_from_trace() {
        let root = Node::mapping(
            vec![scalar_entry("y", Scalar::UInt(3)), scalar_entry("z", Scalar::UInt(4))],
            sp(),
        );
        let mut trace = OverrideTrace::default();
        trace.push(PathExpr::root().child_key("y").with_bang(), Some(Node::scalar(Scalar::UInt(2), sp())));
        trace.push(PathExpr::root().child_key("z"), None);
        let reconstructed = reconstruct_override_node(&root, &trace).unwrap();
        assert_eq!(reconstructed.get("y").unwrap().kind, NodeKind::Scalar(Scalar::UInt(3)));
        assert_eq!(reconstructed.get("z").unwrap().kind, NodeKind::Scalar(Scalar::UInt(4)));
    }
}
