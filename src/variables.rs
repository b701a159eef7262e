//! The `$name` variable engine (C8).
//!
//! Every string scalar is scanned for `$name` occurrences as it is parsed.
//! An occurrence is *whole* if the entire (decoded) string is exactly
//! `$name`, in which case binding may replace the node with any other node
//! kind; otherwise it is *embedded*, in which case binding must supply a
//! scalar and its textual form is spliced into the host string.
//!
//! Binding happens later, at the include site that owns the trailing
//! override (`overrides::apply_override`), not while the occurrence is
//! first recorded — at parse time we only build the table of pending
//! occurrences and snapshot each host string's pre-substitution text into
//! presentation (`value_with_variables`) so the packer can reconstruct the
//! template regardless of whether the variable ever gets bound.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

use crate::ast::Node;
use crate::error::{ErrorKind, YamlError};
use crate::presentation::PathExpr;
use crate::span::Span;

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z0-9]+)").unwrap())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub path: PathExpr,
    pub whole: bool,
}

/// `name -> pending occurrences` for variables seen but not yet bound.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    pub by_name: HashMap<String, Vec<Occurrence>>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.values().all(|v| v.is_empty())
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Scan a decoded string value for `$name` occurrences and register
    /// them against `path`. Returns `true` if the string contains at least
    /// one occurrence (callers use this to decide whether to snapshot
    /// `value_with_variables`).
    pub fn scan(&mut self, path: &PathExpr, text: &str) -> bool {
        let re = var_regex();
        let mut found = false;
        let whole = is_whole_variable(text);
        for caps in re.captures_iter(text) {
            found = true;
            let name = caps.get(1).unwrap().as_str().to_string();
            self.by_name.entry(name).or_default().push(Occurrence {
                path: path.clone(),
                whole,
            });
        }
        found
    }

    /// Merge occurrences from a just-parsed subfile's (now exhausted of
    /// locally-bindable names) table into this table, rebasing every path
    /// under `prefix` (the path of the `!include` node that owns them) so
    /// an enclosing document can still bind them.
    pub fn merge_rebased(&mut self, other: VariableTable, prefix: &PathExpr) {
        for (name, occurrences) in other.by_name {
            if occurrences.is_empty() {
                continue;
            }
            let rebased = occurrences.into_iter().map(|o| Occurrence {
                path: rebase_path(prefix, &o.path),
                whole: o.whole,
            });
            self.by_name.entry(name).or_default().extend(rebased);
        }
    }

    /// Bind `name` to `value` across every occurrence recorded for it,
    /// mutating `root` in place, then drop the name from the table.
    /// `root` must be the document that owns the paths recorded for this
    /// name (i.e. the include's own subfile AST before it is grafted into
    /// a parent).
    pub fn bind(&mut self, root: &mut Node, name: &str, value: &Node, span: Span) -> Result<(), YamlError> {
        let Some(occurrences) = self.by_name.remove(name) else {
            return Err(YamlError::new(
                ErrorKind::BadKey(format!("unknown variable ${name}")),
                span,
            ));
        };
        for occ in occurrences {
            let Some(target) = root.navigate_mut(&occ.path.segments) else {
                continue;
            };
            if occ.whole {
                *target = value.clone();
            } else {
                let replacement = value.as_scalar().ok_or_else(|| {
                    YamlError::new(
                        ErrorKind::InvalidOverride(format!(
                            "variable ${name} is embedded in a string and can only be bound to a scalar"
                        )),
                        span,
                    )
                })?;
                let crate::ast::NodeKind::Scalar(crate::scalar::Scalar::String(s)) = &mut target.kind else {
                    continue;
                };
                let token_re = Regex::new(&format!(r"\${name}\b")).unwrap();
                *s = token_re.replace_all(s, replacement.to_string().replace('$', "$$")).into_owned();
            }
        }
        Ok(())
    }
}

fn is_whole_variable(text: &str) -> bool {
    text.starts_with('$')
        && text[1..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric())
        && text.len() > 1
}

fn rebase_path(prefix: &PathExpr, path: &PathExpr) -> PathExpr {
    let mut segments = prefix.segments.clone();
    segments.extend(path.segments.clone());
    PathExpr {
        segments,
        bang: path.bang,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::scalar::Scalar;
    use crate::span::Span;

    fn sp() -> Span {
        Span::synthetic()
    }

    #[test]
    fn whole_variable_detected() {
        let mut table = VariableTable::new();
        let path = PathExpr::root().child_key("addr");
        assert!(table.scan(&path, "$host"));
        assert!(table.by_name["host"][0].whole);
    }

    #[test]
    fn embedded_variable_detected() {
        let mut table = VariableTable::new();
        let path = PathExpr::root().child_key("addr");
        assert!(table.scan(&path, "$host:$port"));
        assert!(!table.by_name["host"][0].whole);
        assert!(!table.by_name["port"][0].whole);
    }

    #[test]
    fn bind_whole_replaces_node_kind() {
        let mut table = VariableTable::new();
        let path = PathExpr::root().child_key("x");
        table.scan(&path, "$x");
        let mut root = Node::mapping(
            vec![crate::ast::MapEntry {
                key: crate::ast::MapKey::plain("x", sp()),
                value: Node::scalar(Scalar::String("$x".to_string()), sp()),
            }],
            sp(),
        );
        table
            .bind(&mut root, "x", &Node::scalar(Scalar::UInt(7), sp()), sp())
            .unwrap();
        assert_eq!(
            root.get("x").unwrap().kind,
            NodeKind::Scalar(Scalar::UInt(7))
        );
    }

    #[test]
    fn bind_embedded_splices_text() {
        let mut table = VariableTable::new();
        let path = PathExpr::root().child_key("addr");
        table.scan(&path, "$host:$port");
        let mut root = Node::mapping(
            vec![crate::ast::MapEntry {
                key: crate::ast::MapKey::plain("addr", sp()),
                value: Node::scalar(Scalar::String("$host:$port".to_string()), sp()),
            }],
            sp(),
        );
        table
            .bind(&mut root, "host", &Node::scalar(Scalar::String("h".to_string()), sp()), sp())
            .unwrap();
        table
            .bind(&mut root, "port", &Node::scalar(Scalar::UInt(80), sp()), sp())
            .unwrap();
        assert_eq!(
            root.get("addr").unwrap().kind,
            NodeKind::Scalar(Scalar::String("h:80".to_string()))
        );
    }

    #[test]
    fn bind_unknown_name_is_an_error() {
        let mut table = VariableTable::new();
        let mut root = Node::null(sp());
        assert!(table
            .bind(&mut root, "nope", &Node::null(sp()), sp())
            .is_err());
    }
}
