//! Indentation-driven block parsing (C5): sequences, mappings, tags, and
//! the `!include`/`!includeraw` orchestration that lives behind a tag.
//!
//! The central rule is the "value position": after skipping trivia, the
//! parser looks at the upcoming bytes and dispatches on the first
//! distinguishing token — `-` for a sequence, `name:` for a mapping, `!`
//! for a tag, `[`/`{` for flow, `"` for a quoted scalar, anything else for
//! a bare scalar. Every container then loops, re-running that same
//! lookahead at its own column to decide whether to continue or return
//! control to its caller.

use std::path::Path;

use crate::ast::{MapEntry, MapKey, Node};
use crate::error::{ErrorKind, YamlError};
use crate::overrides;
use crate::presentation::{IncludeInfo, OverrideTrace, PathExpr};
use crate::scalar::{classify_bare, Scalar};
use crate::span::Span;
use crate::variables::VariableTable;

use super::{Parser, Session};

impl<'a, 's> Parser<'a, 's> {
    /// Parse whatever value begins at the current position. The caller is
    /// responsible for having already confirmed (via `lookahead`) that a
    /// value legitimately starts here at an acceptable column; this
    /// function reads the column straight off the scanner rather than
    /// taking it as a parameter, since by the time it runs the decision is
    /// already made.
    pub(super) fn parse_value(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        match self.scanner.peek() {
            Some(b'!') => {
                let min_indent = self.scanner.position().column;
                self.parse_tagged_value(min_indent, path)
            }
            Some(b'[') => self.parse_flow_sequence(path),
            Some(b'{') => self.parse_flow_mapping(path),
            Some(b'"') => self.parse_quoted_scalar(path),
            _ => {
                if super::is_sequence_prefix(self.scanner.rest()) {
                    let col = self.scanner.position().column;
                    self.parse_block_sequence(col, path)
                } else if self.peek_mapping_key() {
                    let col = self.scanner.position().column;
                    self.parse_block_mapping(col, path)
                } else {
                    self.parse_bare_scalar(path)
                }
            }
        }
    }

    fn parse_block_sequence(&mut self, seq_col: usize, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        let mut items = Vec::new();
        loop {
            let dash_start = self.scanner.position();
            self.scanner.advance(); // consume '-'
            if matches!(self.scanner.peek(), Some(b' ')) {
                self.scanner.advance();
            }
            let idx = items.len();
            let elem_path = path.child_index(idx);
            self.rec.record_slot(elem_path.clone());

            let lookahead = self.lookahead()?;
            let elem_min = seq_col + 1;
            let value = match lookahead {
                Some((col, _)) if col >= elem_min => self.parse_value(elem_path.clone())?,
                _ => Node::null(Span::new(dash_start, self.scanner.position())),
            };
            items.push(value);

            let next = self.lookahead()?;
            match next {
                None => break,
                Some((col, is_seq)) if col == seq_col && is_seq => continue,
                Some((col, _)) if col < seq_col => break,
                Some((col, is_seq)) if col == seq_col && !is_seq => {
                    return Err(self.err(
                        ErrorKind::WrongData("expected another sequence item at this indent".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
                Some((col, _)) if col > seq_col => {
                    return Err(self.err(
                        ErrorKind::WrongIndent("sequence item is indented past its siblings".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
                _ => break,
            }
        }
        let end = self.scanner.position();
        Ok(Node::sequence(items, Span::new(start, end)))
    }

    pub(super) fn parse_block_mapping(&mut self, mapping_col: usize, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        let mut entries: Vec<MapEntry> = Vec::new();
        loop {
            let (key_span, key_name, is_var) = self.scan_key();
            if !is_var && entries.iter().any(|e: &MapEntry| !e.key.is_variable && e.key.name == key_name) {
                return Err(self.err(
                    ErrorKind::BadKey(format!("duplicate key {key_name:?}")),
                    key_span,
                ));
            }
            // consume ':'
            self.scanner.advance();

            let key_path = path.child_key(&key_name);
            self.rec.record_slot(key_path.clone());

            self.scanner.skip_spaces();
            let lookahead = self.lookahead()?;
            let value = match lookahead {
                Some((col, is_seq)) if col == mapping_col && is_seq => {
                    self.parse_value(key_path.clone())?
                }
                Some((col, _)) if col > mapping_col => self.parse_value(key_path.clone())?,
                _ => Node::null(Span::new(key_span.end, key_span.end)),
            };
            self.rec.record_value(key_path.clone());

            let key = if is_var {
                MapKey::variable(key_name, key_span)
            } else {
                MapKey::plain(key_name, key_span)
            };
            entries.push(MapEntry { key, value });

            let next = self.lookahead()?;
            match next {
                None => break,
                Some((col, _)) if col < mapping_col => break,
                Some((col, _)) if col == mapping_col && self.peek_mapping_key() => continue,
                Some((col, _)) if col == mapping_col => break,
                Some((col, _)) if col > mapping_col => {
                    return Err(self.err(
                        ErrorKind::WrongIndent("unexpected indent inside a mapping".to_string()),
                        Span::new(self.scanner.position(), self.scanner.position()),
                    ));
                }
                _ => break,
            }
        }
        let end = self.scanner.position();
        Ok(Node::mapping(entries, Span::new(start, end)))
    }

    fn parse_quoted_scalar(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let (span, text) = self.scanner.scan_quoted_string()?;
        if self.variables.scan(&path, &text) {
            self.rec.set_value_with_variables(&path, text.clone());
        }
        self.rec.record_value(path);
        Ok(Node::scalar(Scalar::String(text), span))
    }

    fn parse_bare_scalar(&mut self, path: PathExpr) -> Result<Node, YamlError> {
        let start = self.scanner.position();
        loop {
            match self.scanner.peek() {
                None | Some(b'\n') => break,
                Some(b'#') => {
                    let at_start = self.scanner.position().offset == start.offset;
                    if at_start || self.scanner.prev_byte() == Some(b' ') {
                        break;
                    }
                    self.scanner.advance();
                }
                Some(_) => {
                    self.scanner.advance();
                }
            }
        }
        let end = self.scanner.position();
        let raw = self.scanner.slice(start.offset, end.offset);
        let trimmed = raw.trim_end();
        let span = Span::new(start, end);
        let scalar = classify_bare(trimmed);
        if let Scalar::String(s) = &scalar {
            if self.variables.scan(&path, s) {
                self.rec.set_value_with_variables(&path, s.clone());
            }
        }
        self.rec.record_value(path);
        Ok(Node::scalar(scalar, span))
    }

    fn parse_tagged_value(&mut self, min_indent: usize, path: PathExpr) -> Result<Node, YamlError> {
        let tag_start = self.scanner.position();
        self.scanner.advance(); // '!'
        let (_, name) = self.scanner.take_while(|b| b.is_ascii_alphanumeric());
        let name = name.to_string();
        if name.is_empty() {
            return Err(self.err(
                ErrorKind::InvalidTag("tag has no name".to_string()),
                Span::new(tag_start, self.scanner.position()),
            ));
        }
        let tag_span = Span::new(tag_start, self.scanner.position());
        self.scanner.skip_spaces();

        let lookahead = self.lookahead()?;
        let value = match lookahead {
            Some(_) => self.parse_value(path.clone())?,
            None => {
                return Err(self.err(
                    ErrorKind::MissingData(format!("tag !{name} has no value")),
                    tag_span,
                ));
            }
        };

        if name == "include" || name == "includeraw" {
            let Some(Scalar::String(literal)) = value.as_scalar().cloned() else {
                return Err(self.err(
                    ErrorKind::InvalidInclude(format!("!{name} requires a string path")),
                    value.span,
                ));
            };
            return self.do_include(tag_span, &literal, name == "includeraw", min_indent, path);
        }

        let tag = crate::ast::Tag {
            name,
            span: tag_span,
        };
        Ok(value.with_tag(tag))
    }

    fn do_include(
        &mut self,
        tag_span: Span,
        literal: &str,
        raw: bool,
        override_min_indent: usize,
        node_path: PathExpr,
    ) -> Result<Node, YamlError> {
        let Some(dir) = self.dir.clone() else {
            return Err(self.err(
                ErrorKind::InvalidInclude("cannot resolve !include from a bare stream".to_string()),
                tag_span,
            ));
        };
        let resolved = crate::include::resolve(&dir, literal, tag_span)?;
        self.session.include_stack.push(resolved.clone(), tag_span)?;

        let include_result = if raw {
            read_raw(&resolved, tag_span, self.file.as_deref())
                .map(|text| (Node::scalar(Scalar::String(text), tag_span), Default::default(), VariableTable::new()))
        } else {
            parse_subfile(&resolved, self.session)
        };
        self.session.include_stack.pop();

        let (mut subfile_ast, subfile_presentation, mut subfile_vars) = match include_result {
            Ok(v) => v,
            Err(e) => {
                let frame_file = self.file.clone().unwrap_or_else(|| "<stream>".to_string());
                return Err(e.push_include_frame(frame_file, tag_span));
            }
        };

        let override_node = self.maybe_parse_trailing_override(override_min_indent, node_path.clone())?;
        let mut override_trace = OverrideTrace::default();
        let mut variables_trace = Vec::new();
        if let Some(over) = &override_node {
            let (bindings, plain) = overrides::split_variable_bindings(over);
            for (name, value) in bindings {
                subfile_vars.bind(&mut subfile_ast, name, value, tag_span)?;
                variables_trace.push(crate::presentation::VariableBinding {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
            overrides::apply_override(&mut subfile_ast, &plain, PathExpr::root(), &mut override_trace)?;
        }
        self.variables.merge_rebased(subfile_vars, &node_path);

        let span = tag_span.join(subfile_ast.span);
        let info = IncludeInfo {
            path: literal.to_string(),
            raw,
            subfile_presentation: Box::new(subfile_presentation),
            override_trace,
            variables_trace,
        };
        self.rec.set_included(&node_path, info);
        subfile_ast.span = span;
        Ok(subfile_ast)
    }

    /// After an include's own value, look for a trailing block mapping at
    /// or past `min_indent` — the override. Its keys are recorded at
    /// `node_path` so their presentation lands exactly where the merged
    /// value ends up.
    fn maybe_parse_trailing_override(
        &mut self,
        min_indent: usize,
        node_path: PathExpr,
    ) -> Result<Option<Node>, YamlError> {
        let lookahead = self.lookahead()?;
        match lookahead {
            Some((col, _)) if col >= min_indent && self.peek_mapping_key() => {
                Ok(Some(self.parse_block_mapping(col, node_path)?))
            }
            _ => Ok(None),
        }
    }
}

fn read_raw(resolved: &Path, span: Span, including_file: Option<&str>) -> Result<String, YamlError> {
    std::fs::read_to_string(resolved).map_err(|e| {
        let mut err = YamlError::new(
            ErrorKind::InvalidInclude(format!("cannot read {}: {e}", resolved.display())),
            span,
        );
        if let Some(f) = including_file {
            err = err.with_file(f.to_string());
        }
        err
    })
}

fn parse_subfile(
    resolved: &Path,
    session: &mut Session,
) -> Result<(Node, crate::presentation::DocumentPresentation, VariableTable), YamlError> {
    let display_name = resolved.display().to_string();
    let content = read_raw(resolved, Span::synthetic(), None)?;
    let subdir = resolved
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let mut sub = Parser::new(&content, Some(display_name), Some(subdir), session);
    let root = sub.parse_document()?;
    let presentation = sub.rec.finish();
    Ok((root, presentation, sub.variables))
}
