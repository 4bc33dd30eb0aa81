//! String- and comment-aware text scanning.
//!
//! The expansion passes locate keywords in raw source without parsing
//! it; occurrences inside quoted strings or comments never count. An
//! unclosed quote is re-read as a plain character, matching the
//! parser's lenient handling of apostrophes in prose.

use qhtml_syntax::cursor::Cursor;

/// Characters that glue into an identifier for boundary checks. Unlike
/// selector words, `.` and `#` do not glue here: `.q-script` is a
/// valid chained occurrence.
fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Byte offset of the next word-boundary occurrence of `keyword` at or
/// after `from`.
pub fn find_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("//") {
            pos = match rest.find('\n') {
                Some(i) => pos + i + 1,
                None => text.len(),
            };
            continue;
        }
        if rest.starts_with("/*") {
            pos = match rest.find("*/") {
                Some(i) => pos + i + 2,
                None => text.len(),
            };
            continue;
        }
        let c = rest.chars().next()?;
        if c == '"' || c == '\'' {
            pos = skip_quote_lenient(text, pos);
            continue;
        }
        if rest.starts_with(keyword) {
            let before_ok = text[..pos]
                .chars()
                .next_back()
                .is_none_or(|p| !is_ident_char(p));
            let after_ok = text[pos + keyword.len()..]
                .chars()
                .next()
                .is_none_or(|n| !is_ident_char(n));
            if before_ok && after_ok {
                return Some(pos);
            }
        }
        pos += c.len_utf8();
    }
    None
}

/// Position after a quoted string opening at `start`; if the quote
/// never closes on its line, the position right after the quote char so
/// it scans as plain text.
fn skip_quote_lenient(text: &str, start: usize) -> usize {
    let mut chars = text[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return text.len();
    };
    let reread = start + quote.len_utf8();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '\n' => return reread,
            c if c == quote => return start + i + c.len_utf8(),
            _ => {}
        }
    }
    reread
}

/// Offsets of a balanced `{ ... }` block.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpan {
    pub inner_start: usize,
    pub inner_end: usize,
    /// Offset just past the closing brace.
    pub end: usize,
}

/// The block opening at `open` (which must sit on `{`); `None` when the
/// block never closes.
pub fn balanced_block(text: &str, open: usize) -> Option<BlockSpan> {
    let mut cursor = Cursor::at(text, open);
    let (inner_start, inner_end) = cursor.read_balanced().ok()?;
    Some(BlockSpan {
        inner_start,
        inner_end,
        end: cursor.pos(),
    })
}

/// Offset of the next non-trivia character at or after `pos`.
pub fn next_code_offset(text: &str, pos: usize) -> usize {
    let mut cursor = Cursor::at(text, pos);
    // An unterminated block comment just ends the scan here; the
    // enclosing pass leaves the text alone and the parser reports it.
    let _ = cursor.skip_trivia();
    cursor.pos()
}

/// A top-level `name { ... }` occurrence.
#[derive(Debug, Clone)]
pub struct NamedBlock {
    pub name: String,
    pub start: usize,
    pub inner_start: usize,
    pub inner_end: usize,
    pub end: usize,
}

/// Top-level named blocks of `text` in source order. Content nested in
/// other blocks, strings or comments does not participate.
pub fn top_level_named_blocks(text: &str) -> Vec<NamedBlock> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("//") {
            pos = match rest.find('\n') {
                Some(i) => pos + i + 1,
                None => text.len(),
            };
            continue;
        }
        if rest.starts_with("/*") {
            pos = match rest.find("*/") {
                Some(i) => pos + i + 2,
                None => text.len(),
            };
            continue;
        }
        let Some(c) = rest.chars().next() else { break };
        if c == '"' || c == '\'' {
            pos = skip_quote_lenient(text, pos);
            continue;
        }
        if c == '{' {
            // Anonymous block: skip it whole to stay at top level.
            match balanced_block(text, pos) {
                Some(block) => pos = block.end,
                None => break,
            }
            continue;
        }
        if Cursor::is_word_char(c) {
            let start = pos;
            let mut cursor = Cursor::at(text, pos);
            let name = cursor.read_word();
            let brace = next_code_offset(text, cursor.pos());
            if text[brace..].starts_with('{') {
                if let Some(block) = balanced_block(text, brace) {
                    out.push(NamedBlock {
                        name,
                        start,
                        inner_start: block.inner_start,
                        inner_end: block.inner_end,
                        end: block.end,
                    });
                    pos = block.end;
                    continue;
                }
            }
            pos = cursor.pos();
            continue;
        }
        pos += c.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_keyword_boundaries() {
        let text = "xq-script q-scripty q-script";
        assert_eq!(find_keyword(text, "q-script", 0), Some(20));
    }

    #[test]
    fn test_find_keyword_allows_dot_chain() {
        let text = "value.q-script{ x }";
        assert_eq!(find_keyword(text, "q-script", 0), Some(6));
    }

    #[test]
    fn test_find_keyword_skips_strings_and_comments() {
        let text = "\"q-import\" // q-import\n/* q-import */ q-import";
        assert_eq!(find_keyword(text, "q-import", 0), Some(38));
    }

    #[test]
    fn test_find_keyword_survives_apostrophe() {
        let text = "it's fine, q-script here";
        assert_eq!(find_keyword(text, "q-script", 0), Some(11));
    }

    #[test]
    fn test_balanced_block() {
        let text = "abc { x { y } } tail";
        let block = balanced_block(text, 4).unwrap();
        assert_eq!(&text[block.inner_start..block.inner_end], " x { y } ");
        assert_eq!(&text[block.end..], " tail");
        assert!(balanced_block("{ open", 0).is_none());
    }

    #[test]
    fn test_top_level_named_blocks() {
        let text = "who { \"sam\" } div { inner { skip } } plain text mood { low }";
        let blocks = top_level_named_blocks(text);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["who", "div", "mood"]);
        assert_eq!(&text[blocks[0].inner_start..blocks[0].inner_end], " \"sam\" ");
    }

    #[test]
    fn test_top_level_skips_anonymous_blocks() {
        let text = "{ hidden { a } } outer { b }";
        let blocks = top_level_named_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "outer");
    }
}
