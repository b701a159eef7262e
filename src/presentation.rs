//! The presentation side channel (C4) and its wire format (A4).
//!
//! Presentation — comments, blank lines, flow-vs-block choice, include and
//! override provenance — is kept *out* of the AST and addressed instead by
//! [`PathExpr`]: a sequence of `.key` / `[index]` segments, optionally
//! terminated by `!`. The trailing `!` distinguishes "this concerns the
//! scalar value bound at this path" (used for an inline comment that trails
//! a scalar on its own line) from "this concerns the structural slot itself"
//! (the key or sequence dash, used for prefix comments, blank-line counts,
//! and flow/include metadata).
//!
//! Keeping presentation out-of-band is what lets the packer print the same
//! AST with or without it, and lets an override graft a different node's
//! presentation in during recursive repacking (see `packer`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ast::Node;

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, ".{k}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// An addressing path into a document: a chain of segments from the root,
/// optionally marked `!` to address "the scalar value" rather than "the
/// slot".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathExpr {
    pub segments: Vec<Segment>,
    pub bang: bool,
}

impl PathExpr {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self {
            segments,
            bang: false,
        }
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self {
            segments,
            bang: false,
        }
    }

    pub fn with_bang(&self) -> Self {
        Self {
            segments: self.segments.clone(),
            bang: true,
        }
    }

    /// Strip the leading `prefix` segments off of `self`, producing a path
    /// relative to that prefix. Used to turn an absolute path inside an
    /// included subfile into the relative path stored in an override trace.
    pub fn relative_to(&self, prefix: &PathExpr) -> Option<PathExpr> {
        if self.segments.len() < prefix.segments.len() {
            return None;
        }
        if self.segments[..prefix.segments.len()] != prefix.segments[..] {
            return None;
        }
        Some(PathExpr {
            segments: self.segments[prefix.segments.len()..].to_vec(),
            bang: self.bang,
        })
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            write!(f, "{seg}")?;
        }
        if self.bang {
            write!(f, "!")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathParseError(pub String);

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path expression: {}", self.0)
    }
}

impl FromStr for PathExpr {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, bang) = match s.strip_suffix('!') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let mut segments = Vec::new();
        let bytes = body.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    let start = i + 1;
                    let mut j = start;
                    while j < bytes.len() && bytes[j] != b'.' && bytes[j] != b'[' {
                        j += 1;
                    }
                    if j == start {
                        return Err(PathParseError(s.to_string()));
                    }
                    segments.push(Segment::Key(body[start..j].to_string()));
                    i = j;
                }
                b'[' => {
                    let start = i + 1;
                    let Some(close) = body[start..].find(']') else {
                        return Err(PathParseError(s.to_string()));
                    };
                    let num = &body[start..start + close];
                    let idx: usize = num.parse().map_err(|_| PathParseError(s.to_string()))?;
                    segments.push(Segment::Index(idx));
                    i = start + close + 1;
                }
                _ => return Err(PathParseError(s.to_string())),
            }
        }
        Ok(PathExpr { segments, bang })
    }
}

impl Serialize for PathExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PathExpr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PathExpr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Presentation attached to one path in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePresentation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix_comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_comment: Option<String>,
    #[serde(default)]
    pub empty_lines: u8,
    #[serde(default)]
    pub flow_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Box<IncludeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_with_variables: Option<String>,
}

/// Presentation of a node produced by `!include` / `!includeraw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludeInfo {
    pub path: String,
    pub raw: bool,
    pub subfile_presentation: Box<DocumentPresentation>,
    pub override_trace: OverrideTrace,
    pub variables_trace: Vec<VariableBinding>,
}

/// One `$name: value` binding recorded at an inclusion site, in surface
/// order. The packer replays these directly when reconstructing the
/// override block rather than deducing them from the post-substitution
/// AST — deduction (§4.8's "pattern-match the template") is only needed,
/// and only solvable, for the degenerate whole-string case; storing the
/// value that was actually bound sidesteps that ambiguity entirely for
/// the common unmutated-round-trip path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableBinding {
    pub name: String,
    pub value: Node,
}

/// One recorded override application: the relative path it touched, the
/// scalar it replaced (if any), and whether repack has since located the
/// referenced node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_data: Option<Node>,
    #[serde(default)]
    pub found: bool,
}

/// The ordered trail of override applications at one inclusion site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideTrace {
    pub ordered_paths: Vec<PathExpr>,
    pub entries: HashMap<PathExpr, OverrideEntry>,
}

impl OverrideTrace {
    pub fn push(&mut self, path: PathExpr, original_data: Option<Node>) {
        self.entries.insert(
            path.clone(),
            OverrideEntry {
                original_data,
                found: false,
            },
        );
        self.ordered_paths.push(path);
    }
}

/// The flat path → presentation map for one document (top-level file or
/// one included subfile). This is both the in-memory presentation produced
/// by a parse and the shape serialized by `serde_json` for external
/// tooling (§6's "document presentation envelope").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPresentation {
    pub entries: HashMap<PathExpr, NodePresentation>,
}

impl DocumentPresentation {
    pub fn get(&self, path: &PathExpr) -> Option<&NodePresentation> {
        self.entries.get(path)
    }

    pub fn entry(&mut self, path: PathExpr) -> &mut NodePresentation {
        self.entries.entry(path).or_default()
    }
}

/// The mutable builder used while parsing. Tracks the `last_node` /
/// `next_node` staging areas described in §4.2: comments and blank lines
/// accumulate in `pending` until the next node is produced, at which point
/// they transfer onto that node's slot; `last_slot` then lets a same-line
/// trailing comment attach to whatever was just produced.
#[derive(Debug, Default)]
pub struct PresentationRecorder {
    doc: DocumentPresentation,
    pending_prefix: Vec<String>,
    pending_blank: u8,
    last_slot: Option<PathExpr>,
}

impl PresentationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_blank_line(&mut self) {
        self.pending_blank = (self.pending_blank + 1).min(2);
    }

    pub fn note_prefix_comment(&mut self, text: impl Into<String>) {
        self.pending_prefix.push(text.into());
    }

    /// Attach a same-line comment to whatever path was most recently
    /// produced (the scalar-value path if the last thing emitted was a
    /// scalar, the slot path otherwise).
    pub fn note_inline_comment(&mut self, text: impl Into<String>) {
        if let Some(path) = self.last_slot.clone() {
            self.doc.entry(path).inline_comment = Some(text.into());
        } else {
            // A comment before anything has been produced is a leading
            // document-level prefix comment.
            self.pending_prefix.push(text.into());
        }
    }

    /// Drain the currently staged prefix comments and blank-line count,
    /// to be attached to the slot about to be produced.
    pub fn take_pending(&mut self) -> (Vec<String>, u8) {
        let prefix = std::mem::take(&mut self.pending_prefix);
        let blank = std::mem::replace(&mut self.pending_blank, 0);
        (prefix, blank)
    }

    /// Record the structural slot for a key or sequence dash: its staged
    /// prefix comments and blank-line count.
    pub fn record_slot(&mut self, path: PathExpr) {
        let (prefix, blank) = self.take_pending();
        let entry = self.doc.entry(path.clone());
        entry.prefix_comments = prefix;
        entry.empty_lines = blank;
        self.last_slot = Some(path);
    }

    /// Record a scalar value's own presentation slot (the bang path) so a
    /// trailing same-line comment can attach to it.
    pub fn record_value(&mut self, path: PathExpr) {
        let value_path = path.with_bang();
        self.last_slot = Some(value_path);
    }

    pub fn set_flow(&mut self, path: &PathExpr, flow: bool) {
        self.doc.entry(path.clone()).flow_mode = flow;
    }

    pub fn set_value_with_variables(&mut self, path: &PathExpr, template: String) {
        self.doc.entry(path.with_bang()).value_with_variables = Some(template);
    }

    pub fn set_included(&mut self, path: &PathExpr, info: IncludeInfo) {
        self.doc.entry(path.clone()).included = Some(Box::new(info));
    }

    pub fn finish(self) -> DocumentPresentation {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trips_through_display_and_parse() {
        let p = PathExpr::root().child_key("a").child_index(2).child_key("b");
        let s = p.to_string();
        assert_eq!(s, ".a[2].b");
        assert_eq!(PathExpr::from_str(&s).unwrap(), p);
    }

    #[test]
    fn bang_suffix_round_trips() {
        let p = PathExpr::root().child_key("x").with_bang();
        assert_eq!(p.to_string(), ".x!");
        assert_eq!(PathExpr::from_str(".x!").unwrap(), p);
    }

    #[test]
    fn relative_to_strips_prefix() {
        let base = PathExpr::root().child_key("inc");
        let full = base.child_key("y");
        let rel = full.relative_to(&base).unwrap();
        assert_eq!(rel.to_string(), ".y");
    }

    #[test]
    fn blank_lines_cap_at_two() {
        let mut rec = PresentationRecorder::new();
        for _ in 0..5 {
            rec.note_blank_line();
        }
        let (_, blank) = rec.take_pending();
        assert_eq!(blank, 2);
    }
}
