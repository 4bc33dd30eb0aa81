//! Character cursor over DSL source text.
//!
//! Tracks a byte offset and provides the quote-, comment- and
//! brace-aware scanning primitives the parser is built from.

use crate::ParseError;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// A cursor positioned at `pos`, which must lie on a char boundary.
    pub fn at(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    pub fn src(&self) -> &'a str {
        self.src
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    /// Consume `prefix` if the cursor sits on it.
    pub fn eat(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            index: self.pos,
        }
    }

    pub fn error_at(&self, index: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            index,
        }
    }

    /// Selector/identifier characters: letters, digits, `_` `-` `.` `#`.
    pub fn is_word_char(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '#')
    }

    /// Read a run of word characters.
    pub fn read_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if Self::is_word_char(c) {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    /// Skip whitespace and both comment forms. Errors on an unterminated
    /// block comment.
    pub fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            if let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.bump();
                    continue;
                }
            }
            if self.starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if self.starts_with("/*") {
                let open = self.pos;
                self.pos += 2;
                match self.src[self.pos..].find("*/") {
                    Some(i) => self.pos += i + 2,
                    None => return Err(self.error_at(open, "unterminated block comment")),
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Skip spaces and tabs only; newlines stay put.
    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
    }

    /// Read a quoted string starting at the opening quote. Handles `\n`
    /// `\r` `\t`, quote and backslash escapes; other escaped characters
    /// come through literally. Strings are single-line.
    pub fn read_quoted(&mut self) -> Result<String, ParseError> {
        let open = self.pos;
        let quote = match self.bump() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error_at(open, "expected string quote")),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error_at(open, "unterminated string")),
                Some('\\') => {
                    let esc = self
                        .bump()
                        .ok_or_else(|| self.error_at(open, "unterminated string"))?;
                    out.push(match esc {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    /// Consume a `{ ... }` block starting at the opening brace and return
    /// the byte range of its inner text. Nested braces, quoted strings
    /// and comments inside the block do not terminate it.
    pub fn read_balanced(&mut self) -> Result<(usize, usize), ParseError> {
        let open = self.pos;
        if self.bump() != Some('{') {
            return Err(self.error_at(open, "expected '{'"));
        }
        let inner_start = self.pos;
        let mut depth = 1usize;
        loop {
            if self.starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if self.starts_with("/*") {
                let comment_open = self.pos;
                self.pos += 2;
                match self.src[self.pos..].find("*/") {
                    Some(i) => self.pos += i + 2,
                    None => return Err(self.error_at(comment_open, "unterminated block comment")),
                }
                continue;
            }
            match self.peek() {
                None => return Err(self.error_at(open, "unterminated block")),
                Some('"') | Some('\'') => self.skip_quoted_lenient(),
                Some('{') => {
                    depth += 1;
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    let inner_end = self.pos;
                    self.bump();
                    if depth == 0 {
                        return Ok((inner_start, inner_end));
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Skip over a quoted string; an unclosed quote (end of line or end
    /// of input) is re-read as a plain character so apostrophes in prose
    /// do not swallow the rest of a block.
    fn skip_quoted_lenient(&mut self) {
        let start = self.pos;
        let quote = match self.bump() {
            Some(q) => q,
            None => return,
        };
        loop {
            match self.bump() {
                None | Some('\n') => {
                    self.pos = start + quote.len_utf8();
                    return;
                }
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return,
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_trivia() {
        let mut cur = Cursor::new("  // line\n  /* block */  x");
        cur.skip_trivia().unwrap();
        assert_eq!(cur.peek(), Some('x'));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let mut cur = Cursor::new("/* never closed");
        let err = cur.skip_trivia().unwrap_err();
        assert_eq!(err.index, 0);
        assert!(err.message.contains("block comment"));
    }

    #[test]
    fn test_read_quoted_escapes() {
        let mut cur = Cursor::new(r#""a\nb\t\"c\\""#);
        assert_eq!(cur.read_quoted().unwrap(), "a\nb\t\"c\\");
        assert!(cur.is_eof());
    }

    #[test]
    fn test_read_quoted_unterminated() {
        let mut cur = Cursor::new("\"abc");
        let err = cur.read_quoted().unwrap_err();
        assert_eq!(err.index, 0);
    }

    #[test]
    fn test_read_balanced_nested() {
        let src = "{ a { b } c }x";
        let mut cur = Cursor::new(src);
        let (s, e) = cur.read_balanced().unwrap();
        assert_eq!(&src[s..e], " a { b } c ");
        assert_eq!(cur.peek(), Some('x'));
    }

    #[test]
    fn test_read_balanced_ignores_braces_in_strings() {
        let src = "{ \"}\" }x";
        let mut cur = Cursor::new(src);
        let (s, e) = cur.read_balanced().unwrap();
        assert_eq!(&src[s..e], " \"}\" ");
        assert_eq!(cur.peek(), Some('x'));
    }

    #[test]
    fn test_read_balanced_tolerates_apostrophes() {
        let src = "{ don't stop }x";
        let mut cur = Cursor::new(src);
        let (s, e) = cur.read_balanced().unwrap();
        assert_eq!(&src[s..e], " don't stop ");
        assert_eq!(cur.peek(), Some('x'));
    }

    #[test]
    fn test_read_balanced_unterminated() {
        let mut cur = Cursor::new("{ a { b }");
        let err = cur.read_balanced().unwrap_err();
        assert_eq!(err.index, 0);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_read_word() {
        let mut cur = Cursor::new("div.card#x rest");
        assert_eq!(cur.read_word(), "div.card#x");
        assert_eq!(cur.peek(), Some(' '));
    }
}
