//! Flow-style parsing (C6): `[...]` and `{...}`.
//!
//! Flow containers ignore block indentation entirely; `ltrim` is still
//! used to skip whitespace/comments between tokens since its blank-line
//! and comment harvesting is harmless here, it just never gates on
//! column. Sequence elements may be plain values or a single implicit
//! `key: value` pair (which becomes a one-entry mapping); a nested
//! implicit pair inside that value position is rejected. Variable
//! (`$name`) keys are rejected in flow mappings since override-style
//! binding has no meaning inside a flow block.

use crate::ast::{MapEntry, MapKey, Node};
use crate::error::{ErrorKind, YamlError};
use crate::presentation::PathExpr;
use crate::span::Span;

use super::{peek_key_len, Parser};

impl<'a, 's> Parser<'a, 's> {
    pub(super) fn parse_flow_sequence(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        self.scanner.advance(); // '['
        let mut items = Vec::new();
        self.flow_ltrim()?;
        if self.scanner.peek() == Some(b']') {
            self.scanner.advance();
            self.rec.set_flow(&path, true);
            return Ok(Node::sequence(items, Span::new(start, self.scanner.position())));
        }
        loop {
            self.flow_ltrim()?;
            let idx = items.len();
            let elem_path = path.child_index(idx);
            let elem = if self.peek_flow_key() {
                self.parse_flow_implicit_entry(elem_path)?
            } else {
                self.parse_flow_value(elem_path)?
            };
            items.push(elem);
            self.flow_ltrim()?;
            match self.scanner.peek() {
                Some(b',') => {
                    self.scanner.advance();
                    self.flow_ltrim()?;
                    if self.scanner.peek() == Some(b']') {
                        self.scanner.advance();
                        break;
                    }
                }
                Some(b']') => {
                    self.scanner.advance();
                    break;
                }
                _ => {
                    return Err(self.err(
                        ErrorKind::WrongData("expected ',' or ']' in flow sequence".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
            }
        }
        self.rec.set_flow(&path, true);
        let end = self.scanner.position();
        Ok(Node::sequence(items, Span::new(start, end)))
    }

    pub(super) fn parse_flow_mapping(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        self.scanner.advance(); // '{'
        let mut entries = Vec::new();
        self.flow_ltrim()?;
        if self.scanner.peek() == Some(b'}') {
            self.scanner.advance();
            self.rec.set_flow(&path, true);
            return Ok(Node::mapping(entries, Span::new(start, self.scanner.position())));
        }
        loop {
            self.flow_ltrim()?;
            if self.scanner.peek() == Some(b'$') {
                return Err(self.err(
                    ErrorKind::WrongData("variable keys are not allowed inside flow".to_string()),
                    Span::new(self.scanner.position(), self.scanner.position()),
                ));
            }
            let Some(key_len) = peek_key_len(self.scanner.rest()) else {
                return Err(self.err(
                    ErrorKind::WrongData("expected a key inside flow mapping".to_string()),
                    Span::new(self.scanner.position(), self.scanner.position()),
                ));
            };
            let key_start = self.scanner.position();
            for _ in 0..key_len {
                self.scanner.advance();
            }
            let key_span = Span::new(key_start, self.scanner.position());
            let key_name = self.scanner.slice(key_start.offset, self.scanner.position().offset).to_string();
            self.scanner.advance(); // ':'
            self.flow_ltrim()?;
            let key_path = path.child_key(&key_name);
            let value = self.parse_flow_value(key_path)?;
            entries.push(MapEntry {
                key: MapKey::plain(key_name, key_span),
                value,
            });
            self.flow_ltrim()?;
            match self.scanner.peek() {
                Some(b',') => {
                    self.scanner.advance();
                    self.flow_ltrim()?;
                    if self.scanner.peek() == Some(b'}') {
                        self.scanner.advance();
                        break;
                    }
                }
                Some(b'}') => {
                    self.scanner.advance();
                    break;
                }
                _ => {
                    return Err(self.err(
                        ErrorKind::WrongData("expected ',' or '}' in flow mapping".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
            }
        }
        self.rec.set_flow(&path, true);
        let end = self.scanner.position();
        Ok(Node::mapping(entries, Span::new(start, end)))
    }

    /// A sequence element written as `key: value` becomes a one-entry
    /// mapping node.
    fn parse_flow_implicit_entry(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let key_len = peek_key_len(self.scanner.rest()).expect("caller already confirmed this");
        let key_start = self.scanner.position();
        for _ in 0..key_len {
            self.scanner.advance();
        }
        let key_span = Span::new(key_start, self.scanner.position());
        let key_name = self
            .scanner
            .slice(key_start.offset, self.scanner.position().offset)
            .to_string();
        self.scanner.advance(); // ':'
        self.flow_ltrim()?;
        let key_path = path.child_key(&key_name);
        let value = self.parse_flow_value(key_path)?;
        let span = Span::new(key_start, value.span.end);
        Ok(Node::mapping(
            vec![MapEntry {
                key: MapKey::plain(key_name, key_span),
                value,
            }],
            span,
        ))
    }

    /// Parse one flow value. A value position never starts a fresh
    /// implicit mapping — `a: b: c` is a nesting error, not two pairs —
    /// so a `key:`-shaped lookahead here is always rejected; only a fresh
    /// sequence element (handled separately in `parse_flow_sequence`) may
    /// become an implicit entry.
    fn parse_flow_value(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        match self.scanner.peek() {
            Some(b'[') => self.parse_flow_sequence(path),
            Some(b'{') => self.parse_flow_mapping(path),
            Some(b'"') => {
                let (span, text) = self.scanner.scan_quoted_string()?;
                if self.variables.scan(&path, &text) {
                    self.rec.set_value_with_variables(&path, text.clone());
                }
                self.rec.record_value(path);
                Ok(Node::scalar(crate::scalar::Scalar::String(text), span))
            }
            _ => {
                if peek_key_len(self.scanner.rest()).is_some() {
                    return Err(self.err(
                        ErrorKind::WrongData("unexpected ':' inside a flow value".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
                self.parse_flow_bare_scalar(path)
            }
        }
    }

    fn parse_flow_bare_scalar(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        loop {
            match self.scanner.peek() {
                None | Some(b',') | Some(b']') | Some(b'}') | Some(b'\n') => break,
                Some(_) => {
                    self.scanner.advance();
                }
            }
        }
        let end = self.scanner.position();
        let raw = self.scanner.slice(start.offset, end.offset);
        let trimmed = raw.trim();
        let span = Span::new(start, end);
        let scalar = crate::scalar::classify_bare(trimmed);
        if let crate::scalar::Scalar::String(s) = &scalar {
            if self.variables.scan(&path, s) {
                self.rec.set_value_with_variables(&path, s.clone());
            }
        }
        self.rec.record_value(path);
        Ok(Node::scalar(scalar, span))
    }

    /// Whitespace/comment skipping inside flow: same trivia harvesting as
    /// block `ltrim`, column is simply never consulted here.
    fn flow_ltrim(&mut self) -> Result<(), YamlError> {
        self.scanner.ltrim(&mut self.rec)
    }

    fn peek_flow_key(&self) -> bool {
        peek_key_len(self.scanner.rest()).is_some()
    }
}
