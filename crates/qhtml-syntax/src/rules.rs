//! Standalone event-rule mini-language.
//!
//! Sequences of `selector.on("eventName"): { body }` parsed
//! independently of the main DSL. The consuming layer binds them to
//! live elements; this parser only produces the triples.

use crate::ast::Span;
use crate::cursor::Cursor;
use crate::ParseError;

/// One `selector.on("event"): { body }` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRule {
    pub selector: String,
    pub event: String,
    pub body: String,
    pub span: Span,
}

/// Parse a rule sheet into its ordered rules.
pub fn parse_event_rules(text: &str) -> Result<Vec<EventRule>, ParseError> {
    let mut cur = Cursor::new(text);
    let mut rules = Vec::new();
    loop {
        cur.skip_trivia()?;
        if cur.is_eof() {
            break;
        }
        let start = cur.pos();

        // The selector runs to the `.on(` marker and may itself
        // contain dots (`div.card.on("click")`).
        loop {
            if cur.is_eof() {
                return Err(cur.error_at(start, "expected '.on(' after selector"));
            }
            if cur.starts_with(".on(") {
                break;
            }
            cur.bump();
        }
        let selector = text[start..cur.pos()].trim().to_string();
        if selector.is_empty() {
            return Err(cur.error_at(start, "empty selector"));
        }
        cur.eat(".on(");
        cur.skip_trivia()?;
        let event = cur.read_quoted()?;
        cur.skip_trivia()?;
        if cur.bump() != Some(')') {
            return Err(cur.error("expected ')'"));
        }
        cur.skip_trivia()?;
        if cur.bump() != Some(':') {
            return Err(cur.error("expected ':' before rule body"));
        }
        cur.skip_trivia()?;
        let (inner_start, inner_end) = cur.read_balanced()?;
        let body = text[inner_start..inner_end].trim().to_string();
        rules.push(EventRule {
            selector,
            event,
            body,
            span: (start, cur.pos()),
        });

        let mut probe = cur.clone();
        if probe.skip_trivia().is_ok() && probe.peek() == Some(';') {
            probe.bump();
            cur = probe;
        }
    }
    Ok(rules)
}
