//! qhtml DSL syntax
//!
//! Lexer and recursive-descent parser turning raw DSL text into an
//! untyped syntax tree, plus the standalone event-rule mini-language
//! and the reserved-name tables shared by later pipeline stages.

pub mod ast;
pub mod cursor;
pub mod rules;
pub mod tags;

mod parser;

pub use ast::{Ast, AstItem, DefinitionKind, Span, VerbatimKind};
pub use parser::{parse, unquote_body};
pub use rules::{parse_event_rules, EventRule};

/// Parse failure: a message plus the byte offset it was raised at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {index}")]
pub struct ParseError {
    pub message: String,
    pub index: usize,
}
