//! Error model and the caret-based source printer (C12, A1).
//!
//! Every parse failure is a [`YamlError`] carrying a [`ErrorKind`] and the
//! [`Span`] that triggered it. There is no error recovery: a parse either
//! fully succeeds or stops at the first error. The printer renders
//! `filename:line:col: message`, the offending source line, and a caret
//! range, recursing outward through any `!include` chain so the reader
//! sees one stanza per nesting level.

use std::fmt;
use std::io;

use crate::span::Span;

/// The distinct ways a parse can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    BadKey(String),
    BadString(String),
    MissingData(String),
    WrongData(String),
    WrongIndent(String),
    WrongObject(String),
    TabCharacter,
    InvalidTag(String),
    ExtraData(String),
    InvalidInclude(String),
    InvalidOverride(String),
    UnboundVariables(Vec<String>),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::BadKey(msg) => write!(f, "bad key: {msg}"),
            ErrorKind::BadString(msg) => write!(f, "bad string: {msg}"),
            ErrorKind::MissingData(msg) => write!(f, "missing data: {msg}"),
            ErrorKind::WrongData(msg) => write!(f, "wrong data: {msg}"),
            ErrorKind::WrongIndent(msg) => write!(f, "wrong indentation: {msg}"),
            ErrorKind::WrongObject(msg) => write!(f, "wrong object: {msg}"),
            ErrorKind::TabCharacter => write!(f, "tab character in indentation"),
            ErrorKind::InvalidTag(msg) => write!(f, "invalid tag: {msg}"),
            ErrorKind::ExtraData(msg) => write!(f, "extra data: {msg}"),
            ErrorKind::InvalidInclude(msg) => write!(f, "invalid include: {msg}"),
            ErrorKind::InvalidOverride(msg) => write!(f, "invalid override: {msg}"),
            ErrorKind::UnboundVariables(names) => {
                write!(f, "unbound variables: {}", names.join(", "))
            }
        }
    }
}

/// One level of `!include` nesting at the moment an error was raised.
#[derive(Debug, Clone)]
pub struct IncludeFrame {
    pub file: String,
    pub span: Span,
}

/// A terminal parse error: a kind, the span that triggered it, the source
/// file it happened in, and the chain of includes that led there (outermost
/// first).
#[derive(Debug, Clone)]
pub struct YamlError {
    pub kind: ErrorKind,
    pub span: Span,
    pub file: Option<String>,
    pub include_chain: Vec<IncludeFrame>,
}

impl YamlError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            file: None,
            include_chain: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Prepend an including frame, used as the error propagates back up
    /// through nested `!include` parses.
    pub fn push_include_frame(mut self, file: impl Into<String>, span: Span) -> Self {
        self.include_chain.insert(
            0,
            IncludeFrame {
                file: file.into(),
                span,
            },
        );
        self
    }
}

impl fmt::Display for YamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<stream>");
        write!(f, "{file}:{}: {}", self.span.start, self.kind)
    }
}

impl std::error::Error for YamlError {}

/// Failures that can occur while repacking an AST to bytes or to a file
/// tree. I/O failures from the writer callback are propagated; override
/// reconstruction failures are reported but do not stop the pack (the
/// offending trace entry is simply omitted — see `packer`).
#[derive(Debug)]
pub enum PackError {
    Io(io::Error),
    Override(String),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::Io(e) => write!(f, "I/O error while packing: {e}"),
            PackError::Override(msg) => write!(f, "override reconstruction error: {msg}"),
        }
    }
}

impl std::error::Error for PackError {}

impl From<io::Error> for PackError {
    fn from(e: io::Error) -> Self {
        PackError::Io(e)
    }
}

/// Renders a [`YamlError`] with source context and an include-chain trace,
/// from outermost include down to the innermost failing file.
///
/// `source_of` resolves a filename (as recorded in an [`IncludeFrame`] or
/// the error itself) to the text of that file, so the printer can quote the
/// exact offending line. Returns `None` for a frame whose source text is
/// unavailable (e.g. the error came from a bare in-memory stream); such a
/// frame is still printed, minus the quoted line.
pub fn print_error<F>(err: &YamlError, source_of: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::new();
    for frame in &err.include_chain {
        render_stanza(&mut out, &frame.file, frame.span, "included from here", &source_of);
    }
    let file = err.file.as_deref().unwrap_or("<stream>");
    render_stanza(&mut out, file, err.span, &err.kind.to_string(), &source_of);
    out
}

fn render_stanza<F>(out: &mut String, file: &str, span: Span, message: &str, source_of: &F)
where
    F: Fn(&str) -> Option<String>,
{
    use std::fmt::Write as _;
    let _ = writeln!(out, "{file}:{}:{}: {message}", span.start.line, span.start.column);
    if let Some(source) = source_of(file) {
        if let Some(line) = source.lines().nth(span.start.line.saturating_sub(1)) {
            let _ = writeln!(out, "  {line}");
            let width = (span.end.column.max(span.start.column + 1)) - span.start.column;
            let caret = " ".repeat(span.start.column.saturating_sub(1)) + &"^".repeat(width.max(1));
            let _ = writeln!(out, "  {caret}");
        }
    }
}
