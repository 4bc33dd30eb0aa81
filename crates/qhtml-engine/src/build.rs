//! AST to typed model tree.
//!
//! The builder walks parsed items and materializes nodes, routing the
//! document-scoped leftovers (unresolved imports, lifecycle hooks,
//! top-level event bindings) into document metadata and the rule
//! sequence instead of the node tree.

use qhtml_dom::{
    ChainMode, DefinitionNode, DefinitionType, Document, ElementNode, HookDef, LifecycleScript,
    MethodDef, Node, NodeMeta, RawHtmlNode, ScriptRuleNode, TextNode,
};
use qhtml_syntax::ast::{Ast, AstItem, BlockItem, DefinitionItem, DefinitionKind, Span, VerbatimKind};
use qhtml_syntax::tags::{
    has_modifiers, is_known_tag, is_lifecycle_hook, is_text_alias, selector_parts,
};
use tracing::{debug, warn};

/// Convert a parsed syntax tree into a typed document.
///
/// `source` must be the exact text `ast` was parsed from; per-node
/// source snapshots are sliced out of it by span.
pub fn build(ast: &Ast, source: &str) -> Document {
    let mut builder = Builder {
        source,
        doc: Document::new(),
    };
    for item in &ast.items {
        builder.top_level(item);
    }
    let mut doc = builder.doc;
    doc.meta.original_source = Some(source.to_string());
    doc.meta.source_range = Some((0, source.len()));
    debug!(
        nodes = doc.nodes.len(),
        rules = doc.script_rules.len(),
        "built document tree"
    );
    doc
}

struct Builder<'a> {
    source: &'a str,
    doc: Document,
}

impl Builder<'_> {
    fn top_level(&mut self, item: &AstItem) {
        match item {
            AstItem::Event(event) if is_lifecycle_hook(&event.name) => {
                self.doc.meta.lifecycle_scripts.push(LifecycleScript {
                    name: event.name.clone(),
                    body: event.body.clone(),
                });
            }
            // Document-scoped rule: empty selector, `on` prefix dropped.
            AstItem::Event(event) => {
                let name = event.name.strip_prefix("on").unwrap_or(&event.name);
                self.doc.push_script_rule(ScriptRuleNode {
                    selector: String::new(),
                    event: name.to_string(),
                    body: event.body.clone(),
                    meta: self.meta(event.span),
                });
            }
            _ => {
                if let Some(node) = self.node_item(item) {
                    self.doc.push_node(node);
                }
            }
        }
    }

    /// An item in node position. Items that land elsewhere (imports) or
    /// nowhere (stray members) return `None`.
    fn node_item(&mut self, item: &AstItem) -> Option<Node> {
        match item {
            AstItem::Block(block) => Some(self.block(block)),
            AstItem::Definition(def) => Some(self.definition(def)),
            AstItem::Text(text) => Some(Node::Text(TextNode {
                value: text.value.clone(),
                meta: self.meta(text.span),
            })),
            AstItem::Verbatim(v) => match v.kind {
                VerbatimKind::Html => Some(Node::RawHtml(RawHtmlNode {
                    html: v.body.clone(),
                    meta: self.meta(v.span),
                })),
                VerbatimKind::Text => Some(Node::Text(TextNode {
                    value: v.body.clone(),
                    meta: self.meta(v.span),
                })),
                VerbatimKind::Style => {
                    warn!("style block without an owning element; dropped");
                    None
                }
            },
            // An unevaluated script survives as its literal source text,
            // so a pipeline with the script pass disabled loses nothing.
            AstItem::Script(script) => Some(Node::Text(TextNode {
                value: self.slice(script.span).to_string(),
                meta: self.meta(script.span),
            })),
            AstItem::Import(import) => {
                self.record_import(&import.path);
                None
            }
            AstItem::Event(event) => {
                warn!(name = %event.name, "event binding without an owning element; dropped");
                None
            }
            AstItem::Method(method) => {
                warn!(name = %method.name, "function outside a definition; dropped");
                None
            }
            AstItem::Property(prop) => {
                warn!(name = %prop.name, "property without an owning element; dropped");
                None
            }
        }
    }

    /// Materialize a selector block into one element (single token or
    /// class shorthand) or a chain of wrapper elements (nest).
    fn block(&mut self, block: &BlockItem) -> Node {
        if !block.directives.is_empty() {
            debug!(
                groups = block.directives.len(),
                "directive groups kept in the source snapshot only"
            );
        }
        let meta = self.meta(block.span);
        let Some((last, heads)) = block.selectors.split_last() else {
            // the parser always records at least one selector
            return Node::element("div");
        };

        if heads.is_empty() {
            let mut element = element_from_token(last);
            element.meta = meta;
            self.populate(&mut element, &block.items);
            return Node::Element(element);
        }

        if chain_is_class_shorthand(heads, last) {
            let parts = selector_parts(last);
            let mut element = ElementNode {
                tag_name: parts.tag,
                selector_chain: block.selectors.clone(),
                chain_mode: ChainMode::ClassShorthand,
                meta,
                ..ElementNode::default()
            };
            for class in heads {
                element.attributes.merge("class", class, " ");
            }
            for class in &parts.classes {
                element.attributes.merge("class", class, " ");
            }
            if let Some(id) = parts.id {
                element.attributes.set("id", id);
            }
            self.populate(&mut element, &block.items);
            return Node::Element(element);
        }

        // Nest: tokens wrap left to right, the body lands innermost.
        let mut innermost = element_from_token(last);
        self.populate(&mut innermost, &block.items);
        let mut node = Node::Element(innermost);
        for token in heads.iter().rev() {
            let mut wrapper = element_from_token(token);
            wrapper.children.push(node);
            node = Node::Element(wrapper);
        }
        if let Node::Element(outer) = &mut node {
            outer.selector_chain = block.selectors.clone();
            outer.chain_mode = ChainMode::Nest;
            outer.meta = meta;
        }
        node
    }

    fn populate(&mut self, element: &mut ElementNode, items: &[AstItem]) {
        for item in items {
            match item {
                // Text-alias properties append a text child rather than
                // set an attribute.
                AstItem::Property(prop) if is_text_alias(&prop.name) => {
                    element.children.push(Node::Text(TextNode {
                        value: prop.value.clone(),
                        meta: self.meta(prop.span),
                    }));
                }
                AstItem::Property(prop) => {
                    element.attributes.set(prop.name.clone(), prop.value.clone());
                }
                // The first bare run becomes direct text content; later
                // runs are ordinary text children.
                AstItem::Text(text) => {
                    if element.text_content.is_none() && element.children.is_empty() {
                        element.text_content = Some(text.value.clone());
                    } else {
                        element.children.push(Node::Text(TextNode {
                            value: text.value.clone(),
                            meta: self.meta(text.span),
                        }));
                    }
                }
                AstItem::Verbatim(v) if v.kind == VerbatimKind::Style => {
                    element.attributes.merge("style", &v.body, "; ");
                }
                AstItem::Event(event) => {
                    element
                        .attributes
                        .set(event.name.to_ascii_lowercase(), event.body.clone());
                }
                other => {
                    if let Some(node) = self.node_item(other) {
                        element.children.push(node);
                    }
                }
            }
        }
    }

    fn definition(&mut self, def: &DefinitionItem) -> Node {
        let definition_type = match def.kind {
            DefinitionKind::Component => DefinitionType::Component,
            DefinitionKind::Template => DefinitionType::Template,
        };
        let mut node = DefinitionNode {
            component_id: def.id.clone(),
            definition_type,
            template: Vec::new(),
            methods: Vec::new(),
            hooks: Vec::new(),
            meta: self.meta(def.span),
        };
        for item in &def.items {
            match item {
                AstItem::Method(method) => node.methods.push(MethodDef {
                    name: method.name.clone(),
                    params: method.params.clone(),
                    body: method.body.clone(),
                }),
                AstItem::Event(event) if is_lifecycle_hook(&event.name) => {
                    node.hooks.push(HookDef {
                        name: event.name.clone(),
                        body: event.body.clone(),
                    });
                }
                other => {
                    if let Some(child) = self.node_item(other) {
                        node.template.push(child);
                    }
                }
            }
        }
        Node::ComponentDefinition(node)
    }

    fn record_import(&mut self, path: &str) {
        if !self.doc.meta.imports.iter().any(|p| p == path) {
            self.doc.meta.imports.push(path.to_string());
        }
    }

    fn meta(&self, span: Span) -> NodeMeta {
        NodeMeta::with_source(self.slice(span), span)
    }

    fn slice(&self, span: Span) -> &str {
        &self.source[span.0..span.1]
    }
}

/// One element for one selector token; the tag part falls back to `div`
/// for modifier-only tokens like `.card`.
fn element_from_token(token: &str) -> ElementNode {
    let parts = selector_parts(token);
    let mut element = ElementNode {
        tag_name: if parts.tag.is_empty() {
            "div".to_string()
        } else {
            parts.tag
        },
        selector_chain: vec![token.to_string()],
        chain_mode: ChainMode::Single,
        ..ElementNode::default()
    };
    for class in &parts.classes {
        element.attributes.merge("class", class, " ");
    }
    if let Some(id) = parts.id {
        element.attributes.set("id", id);
    }
    element
}

/// Class shorthand needs every leading token to be a bare known tag and
/// the final token's own tag part recognized too; anything else nests.
fn chain_is_class_shorthand(heads: &[String], last: &str) -> bool {
    heads.iter().all(|t| !has_modifiers(t) && is_known_tag(t))
        && is_known_tag(&selector_parts(last).tag)
}
