//! The parser (C5, C6) and its external entry points (§6's Parse API).
//!
//! [`Parser`] ties together the scanner, the presentation recorder, the
//! variable table, and the include stack. It is split across this module
//! (shared lookahead/dispatch helpers and the public API) and two
//! submodules: [`block`] (indentation-driven sequences/mappings/tags,
//! including `!include` resolution) and [`flow`] (`[...]`/`{...}`).
//!
//! One `Parser` exists per file being parsed; a `!include` recurses into a
//! fresh `Parser` over the subfile's text, sharing the same [`Session`] so
//! the include-cycle stack and flags are threaded through correctly.

mod block;
mod flow;

use std::path::PathBuf;

use crate::ast::Node;
use crate::error::{ErrorKind, YamlError};
use crate::include::IncludeStack;
use crate::presentation::{DocumentPresentation, PathExpr, PresentationRecorder};
use crate::scanner::Scanner;
use crate::span::Span;
use crate::variables::VariableTable;

/// Flags controlling one parse. `gen_presentation` is always on in this
/// implementation (there is no separate presentation-less fast path yet;
/// the flag is kept so callers that only want the AST can say so without
/// the packer complaining about a missing envelope), `allow_unbound_variables`
/// relaxes the closure check that normally rejects a document that still
/// has `$name` occurrences nobody ever bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseFlags {
    pub gen_presentation: bool,
    pub allow_unbound_variables: bool,
}

impl ParseFlags {
    pub fn new() -> Self {
        Self {
            gen_presentation: true,
            allow_unbound_variables: false,
        }
    }
}

/// The result of a successful parse: the AST, its presentation envelope,
/// and the names of any variables that were scanned but never bound
/// (always empty unless `allow_unbound_variables` was set).
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub root: Node,
    pub presentation: DocumentPresentation,
    pub unbound_variables: Vec<String>,
}

/// A parse request: flags plus exactly one attached source (a bare byte
/// stream, or a named file within a directory that `!include` may resolve
/// relative to).
pub struct ParseContext {
    flags: ParseFlags,
    source: Option<String>,
    file: Option<String>,
    dir: Option<PathBuf>,
}

impl ParseContext {
    pub fn new(flags: ParseFlags) -> Self {
        Self {
            flags,
            source: None,
            file: None,
            dir: None,
        }
    }

    /// Attach an in-memory byte stream with no associated file. `!include`
    /// is rejected from a context attached this way (there is no directory
    /// to resolve relative paths against).
    pub fn attach_stream(&mut self, text: impl Into<String>) {
        self.source = Some(text.into());
        self.file = None;
        self.dir = None;
    }

    /// Attach a file on disk: `filename` is used only for display in error
    /// messages, `dirpath` is read from to resolve `!include` and is the
    /// root that include paths must stay within.
    pub fn attach_file(
        &mut self,
        filename: impl Into<String>,
        dirpath: impl Into<PathBuf>,
    ) -> std::io::Result<()> {
        let filename = filename.into();
        let dirpath = dirpath.into();
        let text = std::fs::read_to_string(dirpath.join(&filename))?;
        self.source = Some(text);
        self.file = Some(filename);
        self.dir = Some(dirpath);
        Ok(())
    }

    pub fn parse(&self) -> Result<ParsedDocument, YamlError> {
        let Some(source) = &self.source else {
            return Err(YamlError::new(
                ErrorKind::MissingData("no source attached to this parse context".to_string()),
                Span::synthetic(),
            ));
        };
        let mut session = Session {
            include_stack: IncludeStack::new(),
        };
        let mut parser = Parser::new(source, self.file.clone(), self.dir.clone(), &mut session);
        let root = parser.parse_document()?;
        let presentation = parser.rec.finish();
        let unbound = parser.variables.names();
        if !unbound.is_empty() && !self.flags.allow_unbound_variables {
            return Err(YamlError::new(ErrorKind::UnboundVariables(unbound), root.span)
                .with_file(self.file.clone().unwrap_or_else(|| "<stream>".to_string())));
        }
        Ok(ParsedDocument {
            root,
            presentation,
            unbound_variables: unbound,
        })
    }
}

/// Shared state threaded through every recursive subfile parse: the
/// include stack (for cycle detection across the whole tree, not just one
/// file) lives here rather than on `Parser` itself.
pub(crate) struct Session {
    pub include_stack: IncludeStack,
}

/// One file's worth of parsing state. `'a` is the lifetime of the source
/// text being scanned; `'s` is the lifetime of the borrowed [`Session`]
/// shared with every recursive `!include` parse.
pub(crate) struct Parser<'a, 's> {
    scanner: Scanner<'a>,
    rec: PresentationRecorder,
    variables: VariableTable,
    session: &'s mut Session,
    file: Option<String>,
    dir: Option<PathBuf>,
}

impl<'a, 's> Parser<'a, 's> {
    pub(crate) fn new(
        text: &'a str,
        file: Option<String>,
        dir: Option<PathBuf>,
        session: &'s mut Session,
    ) -> Self {
        Self {
            scanner: Scanner::new(text),
            rec: PresentationRecorder::new(),
            variables: VariableTable::new(),
            session,
            file,
            dir,
        }
    }

    fn err(&self, kind: ErrorKind, span: Span) -> YamlError {
        let e = YamlError::new(kind, span);
        match &self.file {
            Some(f) => e.with_file(f.clone()),
            None => e,
        }
    }

    /// Parse the whole document: a single value (possibly empty, i.e.
    /// `Null`), followed by nothing but whitespace/comments.
    pub(crate) fn parse_document(&mut self) -> Result<Node, YamlError> {
        let lookahead = self.lookahead()?;
        let root = match lookahead {
            None => Node::null(Span::synthetic()),
            Some(_) => self.parse_value(PathExpr::root())?,
        };
        let trailing = self.lookahead()?;
        if let Some((col, _)) = trailing {
            let _ = col;
            return Err(self.err(
                ErrorKind::ExtraData("unexpected content after the document's value".to_string()),
                Span::new(self.scanner.position(), self.scanner.position()),
            ));
        }
        Ok(root)
    }

    /// Skip whitespace/blank-lines/comments (harvesting them into
    /// presentation) and report the column and whether the next token
    /// looks like a sequence dash, without consuming anything beyond the
    /// skipped trivia.
    fn lookahead(&mut self) -> Result<Option<(usize, bool)>, YamlError> {
        self.scanner.ltrim(&mut self.rec)?;
        if self.scanner.is_eof() {
            return Ok(None);
        }
        let col = self.scanner.position().column;
        let is_seq = is_sequence_prefix(self.scanner.rest());
        Ok(Some((col, is_seq)))
    }

    /// True if the upcoming bytes look like `name:` (optionally `$name:`)
    /// followed by whitespace, EOF, or a newline — the mapping-key
    /// lookahead used both at a value position (is this value a mapping?)
    /// and inside a mapping's loop (is there another key at this column?).
    fn peek_mapping_key(&self) -> bool {
        peek_key_len(self.scanner.rest()).is_some()
    }

    /// Consume a key token (`$`-prefixed or not), not including the
    /// trailing colon.
    fn scan_key(&mut self) -> (Span, String, bool) {
        let start = self.scanner.position();
        let is_var = self.scanner.peek() == Some(b'$');
        if is_var {
            self.scanner.advance();
        }
        let (_, name) = self.scanner.take_while(|b| b.is_ascii_alphanumeric());
        let end = self.scanner.position();
        (Span::new(start, end), name.to_string(), is_var)
    }
}

fn is_sequence_prefix(rest: &[u8]) -> bool {
    rest.first() == Some(&b'-') && matches!(rest.get(1), None | Some(b' ') | Some(b'\n') | Some(b'\r'))
}

/// Length of a `$?name:` key token at the start of `rest` if followed by
/// whitespace/EOF/newline, else `None`. Shared by the block mapping-key
/// lookahead and the flow implicit-key lookahead.
fn peek_key_len(rest: &[u8]) -> Option<usize> {
    let mut i = 0;
    if rest.first() == Some(&b'$') {
        i += 1;
    }
    let start = i;
    while rest.get(i).is_some_and(|b| b.is_ascii_alphanumeric()) {
        i += 1;
    }
    if i == start {
        return None;
    }
    if rest.get(i) != Some(&b':') {
        return None;
    }
    match rest.get(i + 1) {
        None | Some(b' ') | Some(b'\n') | Some(b'\r') => Some(i),
        _ => None,
    }
}
