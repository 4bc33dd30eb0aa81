//! Untyped syntax tree produced by the DSL parser.
//!
//! Items carry byte spans into the parsed source so the tree builder can
//! record per-node original text.

/// Byte range `(start, end)` into the parsed source.
pub type Span = (usize, usize);

/// A parsed source file: the ordered top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub items: Vec<AstItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstItem {
    /// `selector[, selector...] [{directive}] { items }`
    Block(BlockItem),
    /// `key: value`
    Property(PropertyItem),
    /// Bare words or a quoted string at item position.
    Text(TextItem),
    /// `html{...}` / `text{...}` / `innertext{...}` / `style{...}`
    Verbatim(VerbatimItem),
    /// `on<name>{...}`
    Event(EventItem),
    /// `function name(params){ body }`
    Method(MethodItem),
    /// `q-component id{...}` / `q-template id{...}`
    Definition(DefinitionItem),
    /// `q-import{ path }` still unresolved at parse time
    Import(ImportItem),
    /// `q-script{ body }` still unevaluated at parse time
    Script(ScriptItem),
}

impl AstItem {
    pub fn span(&self) -> Span {
        match self {
            AstItem::Block(item) => item.span,
            AstItem::Property(item) => item.span,
            AstItem::Text(item) => item.span,
            AstItem::Verbatim(item) => item.span,
            AstItem::Event(item) => item.span,
            AstItem::Method(item) => item.span,
            AstItem::Definition(item) => item.span,
            AstItem::Import(item) => item.span,
            AstItem::Script(item) => item.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockItem {
    /// Comma-separated selector tokens, in source order.
    pub selectors: Vec<String>,
    /// Directive blocks preceding the body, each a list of identifiers.
    pub directives: Vec<Vec<String>>,
    pub items: Vec<AstItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyItem {
    pub name: String,
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbatimKind {
    Html,
    Text,
    Style,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerbatimItem {
    pub kind: VerbatimKind,
    pub body: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventItem {
    /// Full event name including the `on` prefix.
    pub name: String,
    pub body: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodItem {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Component,
    Template,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionItem {
    pub kind: DefinitionKind,
    pub id: String,
    pub items: Vec<AstItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    /// Import path with surrounding quotes stripped.
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptItem {
    pub body: String,
    pub span: Span,
}
