//! AST types and small constructors (C13).
//!
//! A [`Node`] is one of three shapes — scalar, sequence, mapping — each
//! carrying a [`Span`] and an optional [`Tag`]. Mapping insertion order is
//! preserved; duplicate keys are rejected at parse time (`parser::block`)
//! before they ever reach this type, so `Mapping` itself does not
//! re-validate uniqueness.

use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;
use crate::span::Span;

/// A `!name` tag attached to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub span: Span,
}

/// A mapping key: an identifier, optionally `$`-prefixed to mark a
/// variable-setting key (only meaningful in an override block, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapKey {
    pub name: String,
    pub is_variable: bool,
    pub span: Span,
}

impl MapKey {
    pub fn plain(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            is_variable: false,
            span,
        }
    }

    pub fn variable(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            is_variable: true,
            span,
        }
    }

    /// The full surface text of the key, including a leading `$` if it is
    /// a variable key.
    pub fn surface(&self) -> String {
        if self.is_variable {
            format!("${}", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: MapKey,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Vec<MapEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub tag: Option<Tag>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn scalar(scalar: Scalar, span: Span) -> Self {
        Self::new(NodeKind::Scalar(scalar), span)
    }

    pub fn null(span: Span) -> Self {
        Self::scalar(Scalar::Null, span)
    }

    pub fn sequence(items: Vec<Node>, span: Span) -> Self {
        Self::new(NodeKind::Sequence(items), span)
    }

    pub fn mapping(entries: Vec<MapEntry>, span: Span) -> Self {
        Self::new(NodeKind::Mapping(entries), span)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[MapEntry]> {
        match &self.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Vec<MapEntry>> {
        match &mut self.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Navigate to the node at `segments` (a path relative to `self`),
    /// stepping through mapping keys and sequence indices.
    pub fn navigate(&self, segments: &[crate::presentation::Segment]) -> Option<&Node> {
        use crate::presentation::Segment;
        let mut cur = self;
        for seg in segments {
            cur = match (seg, &cur.kind) {
                (Segment::Key(k), NodeKind::Mapping(entries)) => {
                    &entries.iter().find(|e| &e.key.name == k)?.value
                }
                (Segment::Index(i), NodeKind::Sequence(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn navigate_mut(&mut self, segments: &[crate::presentation::Segment]) -> Option<&mut Node> {
        use crate::presentation::Segment;
        let mut cur = self;
        for seg in segments {
            cur = match (seg, &mut cur.kind) {
                (Segment::Key(k), NodeKind::Mapping(entries)) => {
                    &mut entries.iter_mut().find(|e| &e.key.name == k)?.value
                }
                (Segment::Index(i), NodeKind::Sequence(items)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?
            .iter()
            .find(|e| e.key.name == key)
            .map(|e| &e.value)
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Scalar(s) => s.kind_name(),
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Mapping(_) => "mapping",
        }
    }
}
