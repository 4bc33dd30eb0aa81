//! Recursive-descent parser for the qhtml DSL.
//!
//! Input is expected to have passed through include resolution and
//! macro/script expansion already; unexpanded `q-script{}` and
//! unresolved `q-import{}` occurrences are still accepted as items so a
//! pipeline with those passes disabled degrades gracefully.

use tracing::debug;

use crate::ast::{
    Ast, AstItem, BlockItem, DefinitionItem, DefinitionKind, EventItem, ImportItem, MethodItem,
    PropertyItem, ScriptItem, TextItem, VerbatimItem, VerbatimKind,
};
use crate::cursor::Cursor;
use crate::ParseError;

/// Parse a complete source text into its top-level items.
pub fn parse(text: &str) -> Result<Ast, ParseError> {
    debug!(len = text.len(), "parsing qhtml source");
    let mut parser = Parser {
        cur: Cursor::new(text),
    };
    let items = parser.parse_items()?;
    parser.cur.skip_trivia()?;
    if !parser.cur.is_eof() {
        return Err(parser.cur.error("unmatched '}'"));
    }
    debug!(items = items.len(), "parsed qhtml source");
    Ok(Ast { items })
}

/// Strip surrounding quotes from a block body that is exactly one quoted
/// string; otherwise return the trimmed body unchanged.
pub fn unquote_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('"') || trimmed.starts_with('\'') {
        let mut cur = Cursor::new(trimmed);
        if let Ok(value) = cur.read_quoted() {
            if cur.is_eof() {
                return value;
            }
        }
    }
    trimmed.to_string()
}

struct Parser<'a> {
    cur: Cursor<'a>,
}

impl<'a> Parser<'a> {
    /// Parse items until end of input or a closing `}` (not consumed).
    fn parse_items(&mut self) -> Result<Vec<AstItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.cur.skip_trivia()?;
            match self.cur.peek() {
                None | Some('}') => break,
                Some(';') => {
                    self.cur.bump();
                }
                Some('"') | Some('\'') => {
                    let start = self.cur.pos();
                    let value = self.cur.read_quoted()?;
                    items.push(AstItem::Text(TextItem {
                        value,
                        span: (start, self.cur.pos()),
                    }));
                }
                Some(c) if Cursor::is_word_char(c) => items.push(self.parse_word_item()?),
                Some(c) => return Err(self.cur.error(format!("unexpected character '{c}'"))),
            }
        }
        Ok(items)
    }

    /// An item opening with a word: keyword head, block, property or text.
    fn parse_word_item(&mut self) -> Result<AstItem, ParseError> {
        let start = self.cur.pos();
        let word = self.cur.read_word();

        match word.as_str() {
            "q-component" => return self.parse_definition(DefinitionKind::Component, start),
            "q-template" => return self.parse_definition(DefinitionKind::Template, start),
            "function" => return self.parse_method(start),
            _ => {}
        }

        if let Some(kind) = verbatim_kind(&word) {
            if self.peek_past_trivia_is('{')? {
                let body = self.read_block_body()?;
                let body = match kind {
                    VerbatimKind::Text => unquote_body(&body),
                    VerbatimKind::Html | VerbatimKind::Style => body.trim().to_string(),
                };
                return Ok(AstItem::Verbatim(VerbatimItem {
                    kind,
                    body,
                    span: (start, self.cur.pos()),
                }));
            }
        }
        if word == "q-import" && self.peek_past_trivia_is('{')? {
            let body = self.read_block_body()?;
            return Ok(AstItem::Import(ImportItem {
                path: unquote_body(&body),
                span: (start, self.cur.pos()),
            }));
        }
        if word == "q-script" && self.peek_past_trivia_is('{')? {
            let body = self.read_block_body()?;
            return Ok(AstItem::Script(ScriptItem {
                body,
                span: (start, self.cur.pos()),
            }));
        }
        if is_event_name(&word) && self.peek_past_trivia_is('{')? {
            let body = self.read_block_body()?;
            return Ok(AstItem::Event(EventItem {
                name: word,
                body: body.trim().to_string(),
                span: (start, self.cur.pos()),
            }));
        }

        let mut probe = self.cur.clone();
        probe.skip_trivia()?;
        match probe.peek() {
            Some(':') => {
                self.cur = probe;
                self.cur.bump();
                let value = self.parse_property_value()?;
                return Ok(AstItem::Property(PropertyItem {
                    name: word,
                    value,
                    span: (start, self.cur.pos()),
                }));
            }
            Some(',') | Some('{') => return self.parse_block(word, start),
            _ => {}
        }

        self.parse_text_run(word, start)
    }

    /// Merge consecutive bare words into one text item, stopping before a
    /// word that itself opens a property, selector list or block.
    fn parse_text_run(&mut self, first: String, start: usize) -> Result<AstItem, ParseError> {
        let mut value = first;
        loop {
            let mut probe = self.cur.clone();
            if probe.skip_trivia().is_err() {
                break;
            }
            match probe.peek() {
                Some(c) if Cursor::is_word_char(c) => {
                    let next = probe.read_word();
                    let mut after = probe.clone();
                    if after.skip_trivia().is_err() {
                        break;
                    }
                    if matches!(after.peek(), Some(':') | Some(',') | Some('{')) {
                        break;
                    }
                    value.push(' ');
                    value.push_str(&next);
                    self.cur = probe;
                }
                _ => break,
            }
        }
        Ok(AstItem::Text(TextItem {
            value,
            span: (start, self.cur.pos()),
        }))
    }

    /// A property value: quoted string or unquoted run to end of line,
    /// `;` or `}`.
    fn parse_property_value(&mut self) -> Result<String, ParseError> {
        self.cur.skip_spaces();
        let value = match self.cur.peek() {
            Some('"') | Some('\'') => self.cur.read_quoted()?,
            _ => {
                let start = self.cur.pos();
                while let Some(c) = self.cur.peek() {
                    if matches!(c, '\n' | '\r' | ';' | '}') {
                        break;
                    }
                    self.cur.bump();
                }
                self.cur.src()[start..self.cur.pos()].trim().to_string()
            }
        };
        let mut probe = self.cur.clone();
        probe.skip_spaces();
        if probe.peek() == Some(';') {
            probe.bump();
            self.cur = probe;
        }
        Ok(value)
    }

    /// `selector[, selector...] [{directive}] { items }`, first selector
    /// already consumed.
    fn parse_block(&mut self, first: String, start: usize) -> Result<AstItem, ParseError> {
        let mut selectors = vec![first];
        loop {
            self.cur.skip_trivia()?;
            match self.cur.peek() {
                Some(',') => {
                    self.cur.bump();
                    self.cur.skip_trivia()?;
                    match self.cur.peek() {
                        Some(c) if Cursor::is_word_char(c) => selectors.push(self.cur.read_word()),
                        _ => return Err(self.cur.error("expected selector after ','")),
                    }
                }
                Some('{') => break,
                _ => return Err(self.cur.error("expected '{' after selector list")),
            }
        }

        // Directive blocks are identifier-only `{...}` groups that are
        // immediately followed by another block; the last block is the body.
        let mut directives = Vec::new();
        loop {
            let mut probe = self.cur.clone();
            let (inner_start, inner_end) = probe.read_balanced()?;
            probe.skip_trivia()?;
            if probe.peek() != Some('{') {
                break;
            }
            let inner = &self.cur.src()[inner_start..inner_end];
            let words: Vec<String> = inner.split_whitespace().map(str::to_string).collect();
            if words.is_empty()
                || !words
                    .iter()
                    .all(|w| w.chars().all(Cursor::is_word_char))
            {
                break;
            }
            directives.push(words);
            self.cur.read_balanced()?;
            self.cur.skip_trivia()?;
        }

        let body_open = self.cur.pos();
        if self.cur.bump() != Some('{') {
            return Err(self.cur.error_at(body_open, "expected '{'"));
        }
        let items = self.parse_items()?;
        self.cur.skip_trivia()?;
        if self.cur.bump() != Some('}') {
            return Err(self.cur.error_at(body_open, "unterminated block"));
        }
        Ok(AstItem::Block(BlockItem {
            selectors,
            directives,
            items,
            span: (start, self.cur.pos()),
        }))
    }

    /// `q-component id{...}` / `q-template id{...}`; the id may embed a
    /// `q-script{...}` expression.
    fn parse_definition(
        &mut self,
        kind: DefinitionKind,
        start: usize,
    ) -> Result<AstItem, ParseError> {
        self.cur.skip_trivia()?;
        let id_start = self.cur.pos();
        let mut id = String::new();
        loop {
            match self.cur.peek() {
                Some(c) if Cursor::is_word_char(c) => id.push_str(&self.cur.read_word()),
                Some('{') if ends_with_script_keyword(&id) => {
                    let (inner_start, inner_end) = self.cur.read_balanced()?;
                    id.push('{');
                    id.push_str(&self.cur.src()[inner_start..inner_end]);
                    id.push('}');
                }
                _ => break,
            }
        }
        if id.is_empty() {
            return Err(self.cur.error_at(id_start, "expected definition id"));
        }

        self.cur.skip_trivia()?;
        let body_open = self.cur.pos();
        if self.cur.bump() != Some('{') {
            return Err(self.cur.error_at(body_open, "expected '{' after definition id"));
        }
        let items = self.parse_items()?;
        self.cur.skip_trivia()?;
        if self.cur.bump() != Some('}') {
            return Err(self.cur.error_at(body_open, "unterminated block"));
        }
        Ok(AstItem::Definition(DefinitionItem {
            kind,
            id,
            items,
            span: (start, self.cur.pos()),
        }))
    }

    /// `function name(params){ body }`, keyword already consumed.
    fn parse_method(&mut self, start: usize) -> Result<AstItem, ParseError> {
        self.cur.skip_trivia()?;
        let name = self.cur.read_word();
        if name.is_empty() {
            return Err(self.cur.error("expected method name"));
        }
        self.cur.skip_trivia()?;
        if self.cur.bump() != Some('(') {
            return Err(self.cur.error("expected '(' after method name"));
        }
        let mut params = Vec::new();
        loop {
            self.cur.skip_trivia()?;
            match self.cur.peek() {
                Some(')') => {
                    self.cur.bump();
                    break;
                }
                Some(',') => {
                    self.cur.bump();
                }
                Some(c) if Cursor::is_word_char(c) => params.push(self.cur.read_word()),
                _ => return Err(self.cur.error("expected parameter or ')'")),
            }
        }
        let body = self.read_block_body()?;
        Ok(AstItem::Method(MethodItem {
            name,
            params,
            body: body.trim().to_string(),
            span: (start, self.cur.pos()),
        }))
    }

    fn read_block_body(&mut self) -> Result<String, ParseError> {
        self.cur.skip_trivia()?;
        let (inner_start, inner_end) = self.cur.read_balanced()?;
        Ok(self.cur.src()[inner_start..inner_end].to_string())
    }

    fn peek_past_trivia_is(&self, target: char) -> Result<bool, ParseError> {
        let mut probe = self.cur.clone();
        probe.skip_trivia()?;
        Ok(probe.peek() == Some(target))
    }
}

fn verbatim_kind(word: &str) -> Option<VerbatimKind> {
    match word {
        "html" => Some(VerbatimKind::Html),
        "text" | "innertext" => Some(VerbatimKind::Text),
        "style" => Some(VerbatimKind::Style),
        _ => None,
    }
}

/// `on` followed by a plain alphanumeric name, e.g. `onclick`. Hyphenated
/// words like `once-widget` stay ordinary selectors.
fn is_event_name(word: &str) -> bool {
    word.len() > 2
        && word.starts_with("on")
        && word[2..].chars().all(|c| c.is_ascii_alphanumeric())
}

/// True if the last word of the accumulated id is exactly `q-script`.
fn ends_with_script_keyword(id: &str) -> bool {
    match id.strip_suffix("q-script") {
        Some(rest) => rest
            .chars()
            .next_back()
            .is_none_or(|c| !Cursor::is_word_char(c)),
        None => false,
    }
}
