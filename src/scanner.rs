//! The low-level character scanner (C2).
//!
//! Consumes a byte stream with O(1) lookahead over its UTF-8 decoding.
//! Exposes the primitives the block/flow parsers are built from: `peek`,
//! `advance`, `take_while`, `take_until`, and `ltrim` (which simultaneously
//! eats horizontal whitespace, counts blank lines, and harvests `#`
//! comments into the presentation recorder).

use crate::error::{ErrorKind, YamlError};
use crate::presentation::PresentationRecorder;
use crate::span::{Position, Span};

pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: Position,
    line_start_offset: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: Position::start(),
            line_start_offset: 0,
        }
    }

    pub fn position(&self) -> Position {
        self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos.offset >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos.offset).copied()
    }

    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos.offset + ahead).copied()
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos.offset..]
    }

    /// The raw source text between two byte offsets, tolerating
    /// non-UTF-8 by falling back to an empty slice (callers that need
    /// lossless bytes should not rely on this for binary content; YAML
    /// scalar lexemes are always valid UTF-8 by construction).
    pub fn slice(&self, start_offset: usize, end_offset: usize) -> &'a str {
        std::str::from_utf8(&self.bytes[start_offset..end_offset]).unwrap_or("")
    }

    pub fn prev_byte(&self) -> Option<u8> {
        if self.pos.offset == 0 {
            None
        } else {
            self.bytes.get(self.pos.offset - 1).copied()
        }
    }

    pub fn starts_with(&self, needle: &str) -> bool {
        self.rest().starts_with(needle.as_bytes())
    }

    /// Advance one byte, updating line/column bookkeeping. Column is
    /// derived from `offset - line_start_offset`, so no rescanning is
    /// needed to answer "what column am I at".
    pub fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos.offset += 1;
        if b == b'\n' {
            self.pos.line += 1;
            self.pos.column = 1;
            self.line_start_offset = self.pos.offset;
        } else {
            self.pos.column = self.pos.offset - self.line_start_offset + 1;
        }
        Some(b)
    }

    pub fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> (Span, &'a str) {
        let start = self.pos;
        let start_off = self.pos.offset;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start_off..self.pos.offset]).unwrap_or("");
        (Span::new(start, self.pos), text)
    }

    pub fn take_until(&mut self, delims: &[u8]) -> (Span, &'a str) {
        self.take_while(|b| !delims.contains(&b))
    }

    /// Skip horizontal whitespace and harvest comments/blank lines into
    /// the presentation recorder. Returns an error if a tab is encountered
    /// (tabs are never permitted in indentation-significant positions).
    pub fn ltrim(&mut self, rec: &mut PresentationRecorder) -> Result<(), YamlError> {
        loop {
            match self.peek() {
                Some(b' ') => {
                    self.advance();
                }
                Some(b'\t') => {
                    return Err(YamlError::new(ErrorKind::TabCharacter, Span::new(self.pos, self.pos)));
                }
                Some(b'\n') => {
                    // `column == 1` means nothing has been consumed on this
                    // line yet this call, so the line was genuinely empty.
                    // A newline reached after real content (a value, a key,
                    // a comment, already-skipped spaces left by an earlier
                    // call) just ends that line and isn't itself blank.
                    let was_blank_line = self.pos.column == 1;
                    self.advance();
                    if was_blank_line {
                        rec.note_blank_line();
                    }
                }
                Some(b'\r') => {
                    self.advance();
                }
                Some(b'#') => {
                    let same_line = self.pos.column > 1;
                    let (_, text) = self.take_until(&[b'\n']);
                    let text = text.trim_end().to_string();
                    if same_line {
                        rec.note_inline_comment(text);
                    } else {
                        rec.note_prefix_comment(text);
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Skip spaces/tabs only (no newline, no comment harvesting) — used
    /// inside flow containers where blank-line/comment semantics do not
    /// apply the same way.
    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ')) {
            self.advance();
        }
    }

    /// Column of the first non-space character on the current line,
    /// without consuming input. Used by the block parser to decide
    /// indentation before committing to a parse.
    pub fn peek_indent(&self) -> usize {
        let mut off = self.pos.offset;
        // Walk back to the start of the line, then count spaces forward.
        while off > 0 && self.bytes[off - 1] != b'\n' {
            off -= 1;
        }
        let mut col = 1;
        while self.bytes.get(off).copied() == Some(b' ') {
            off += 1;
            col += 1;
        }
        col
    }

    /// Decode a double-quoted string starting at the current `"`.
    /// Supported escapes: `\" \\ \a \b \e \f \n \r \t \v \uXXXX`.
    /// Non-decodable bytes in the source are passed through raw.
    pub fn scan_quoted_string(&mut self) -> Result<(Span, String), YamlError> {
        let start = self.pos;
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.advance();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(YamlError::new(
                        ErrorKind::BadString("unclosed quoted string".to_string()),
                        Span::new(start, self.pos),
                    ));
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(b'"') => {
                            out.push('"');
                            self.advance();
                        }
                        Some(b'\\') => {
                            out.push('\\');
                            self.advance();
                        }
                        Some(b'a') => {
                            out.push('\x07');
                            self.advance();
                        }
                        Some(b'b') => {
                            out.push('\x08');
                            self.advance();
                        }
                        Some(b'e') => {
                            out.push('\x1b');
                            self.advance();
                        }
                        Some(b'f') => {
                            out.push('\x0c');
                            self.advance();
                        }
                        Some(b'n') => {
                            out.push('\n');
                            self.advance();
                        }
                        Some(b'r') => {
                            out.push('\r');
                            self.advance();
                        }
                        Some(b't') => {
                            out.push('\t');
                            self.advance();
                        }
                        Some(b'v') => {
                            out.push('\x0b');
                            self.advance();
                        }
                        Some(b'u') => {
                            self.advance();
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let Some(b) = self.peek() else {
                                    return Err(YamlError::new(
                                        ErrorKind::BadString("truncated \\u escape".to_string()),
                                        Span::new(start, self.pos),
                                    ));
                                };
                                let digit = (b as char).to_digit(16).ok_or_else(|| {
                                    YamlError::new(
                                        ErrorKind::BadString("invalid \\u escape".to_string()),
                                        Span::new(start, self.pos),
                                    )
                                })?;
                                code = code * 16 + digit;
                                self.advance();
                            }
                            match char::from_u32(code) {
                                Some(c) => out.push(c),
                                None => out.push('\u{FFFD}'),
                            }
                        }
                        _ => {
                            return Err(YamlError::new(
                                ErrorKind::BadString("invalid backslash escape".to_string()),
                                Span::new(start, self.pos),
                            ));
                        }
                    }
                }
                Some(b) if b < 0x80 => {
                    out.push(b as char);
                    self.advance();
                }
                Some(_) => {
                    // Start of a (possibly multi-byte, possibly broken)
                    // UTF-8 sequence; decode what we can, else pass the
                    // raw byte through.
                    let rest = self.rest();
                    match std::str::from_utf8(rest) {
                        Ok(s) => {
                            let c = s.chars().next().unwrap();
                            out.push(c);
                            for _ in 0..c.len_utf8() {
                                self.advance();
                            }
                        }
                        Err(e) if e.valid_up_to() > 0 => {
                            let s = std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap();
                            let c = s.chars().next().unwrap();
                            out.push(c);
                            for _ in 0..c.len_utf8() {
                                self.advance();
                            }
                        }
                        Err(_) => {
                            out.push(self.peek().unwrap() as char);
                            self.advance();
                        }
                    }
                }
            }
        }
        Ok((Span::new(start, self.pos), out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_basic_escapes() {
        let mut s = Scanner::new(r#""a\nb\tc""#);
        let (_, text) = s.scan_quoted_string().unwrap();
        assert_eq!(text, "a\nb\tc");
    }

    #[test]
    fn decodes_unicode_escape() {
        let mut s = Scanner::new(r#""é""#);
        let (_, text) = s.scan_quoted_string().unwrap();
        assert_eq!(text, "é");
    }

    #[test]
    fn unclosed_string_is_an_error() {
        let mut s = Scanner::new(r#""abc"#);
        assert!(s.scan_quoted_string().is_err());
    }

    #[test]
    fn ltrim_rejects_tabs() {
        let mut s = Scanner::new("\tfoo");
        let mut rec = PresentationRecorder::new();
        assert!(s.ltrim(&mut rec).is_err());
    }

    #[test]
    fn comment_line_terminator_is_not_a_blank_line() {
        let mut s = Scanner::new("# hi\nfoo");
        let mut rec = PresentationRecorder::new();
        s.ltrim(&mut rec).unwrap();
        let (prefix, blank) = rec.take_pending();
        assert_eq!(prefix, vec!["hi".to_string()]);
        assert_eq!(blank, 0);
    }

    #[test]
    fn real_blank_line_after_comment_still_counts() {
        let mut s = Scanner::new("# hi\n\nfoo");
        let mut rec = PresentationRecorder::new();
        s.ltrim(&mut rec).unwrap();
        let (_, blank) = rec.take_pending();
        assert_eq!(blank, 1);
    }

    #[test]
    fn newline_ending_real_content_is_not_a_blank_line() {
        let mut s = Scanner::new("1\nfoo");
        let mut rec = PresentationRecorder::new();
        s.take_while(|b| b != b'\n'); // consume "1", landing mid-line
        s.ltrim(&mut rec).unwrap();
        let (_, blank) = rec.take_pending();
        assert_eq!(blank, 0);
    }

    #[test]
    fn ltrim_caps_blank_lines_at_two() {
        let mut s = Scanner::new("\n\n\n\nfoo");
        let mut rec = PresentationRecorder::new();
        s.ltrim(&mut rec).unwrap();
        let (_, blank) = rec.take_pending();
        assert_eq!(blank, 2);
    }
}
