//! Re-emission of DSL source text from a document.
//!
//! A clean tree reproduces the exact text it was parsed from: the
//! document (and every node) keeps its original slice until a tracked
//! mutation flips the dirty flag, at which point emission falls back to
//! structural form for the dirty parts only. Clean descendants of a
//! dirty node still splice their original text. Structural form puts
//! document-level lifecycle blocks and document-scoped event bindings
//! ahead of the node sequence.

use crate::document::Document;
use crate::node::{DefinitionType, ElementNode, InstanceNode, Node, SlotNode};

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Splice `meta.originalSource` for clean nodes instead of
    /// re-emitting them structurally.
    pub preserve_original: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            preserve_original: true,
        }
    }
}

pub fn to_dsl_text(doc: &Document) -> String {
    to_dsl_text_with(doc, &EmitOptions::default())
}

pub fn to_dsl_text_with(doc: &Document, options: &EmitOptions) -> String {
    if options.preserve_original && !doc.meta.dirty {
        if let Some(source) = &doc.meta.original_source {
            return source.clone();
        }
    }
    let mut lines = Vec::new();
    for hook in &doc.meta.lifecycle_scripts {
        lines.push(format!("{} {{ {} }}", hook.name, hook.body));
    }
    // Rules with a selector come from a separate sheet and stay out of
    // band; document-scoped bindings re-emit in their source form.
    for rule in doc.script_rules() {
        if rule.selector.is_empty() {
            lines.push(format!("on{} {{ {} }}", rule.event, rule.body));
        }
    }
    for node in &doc.nodes {
        emit_node(&mut lines, node, 0, options);
    }
    lines.join("\n")
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn emit_node(lines: &mut Vec<String>, node: &Node, depth: usize, options: &EmitOptions) {
    if options.preserve_original && !node.meta().dirty {
        if let Some(source) = &node.meta().original_source {
            lines.push(format!("{}{}", indent(depth), source));
            return;
        }
    }
    match node {
        Node::Element(el) => emit_element(lines, el, depth, options),
        Node::Text(text) => lines.push(format!(
            "{}text {{ \"{}\" }}",
            indent(depth),
            escape(&text.value)
        )),
        Node::RawHtml(raw) => {
            lines.push(format!("{}html {{ {} }}", indent(depth), raw.html));
        }
        Node::ComponentDefinition(def) => {
            let keyword = match def.definition_type {
                DefinitionType::Component => "q-component",
                DefinitionType::Template => "q-template",
            };
            lines.push(format!("{}{} {} {{", indent(depth), keyword, def.component_id));
            for item in &def.template {
                emit_node(lines, item, depth + 1, options);
            }
            for method in &def.methods {
                lines.push(format!(
                    "{}function {}({}) {{ {} }}",
                    indent(depth + 1),
                    method.name,
                    method.params.join(", "),
                    method.body
                ));
            }
            for hook in &def.hooks {
                lines.push(format!(
                    "{}{} {{ {} }}",
                    indent(depth + 1),
                    hook.name,
                    hook.body
                ));
            }
            lines.push(format!("{}}}", indent(depth)));
        }
        Node::ComponentInstance(inst) | Node::TemplateInstance(inst) => {
            emit_instance(lines, inst, depth, options);
        }
        Node::Slot(slot) => emit_slot(lines, slot, depth, options),
        // Rule nodes never sit in the node tree; the document-level
        // pass emits the ones that belong in the text.
        Node::ScriptRule(_) => {}
    }
}

fn emit_element(lines: &mut Vec<String>, el: &ElementNode, depth: usize, options: &EmitOptions) {
    let has_body = !el.attributes.is_empty() || el.text_content.is_some() || !el.children.is_empty();
    if !has_body {
        lines.push(format!("{}{} {{ }}", indent(depth), el.tag_name));
        return;
    }
    lines.push(format!("{}{} {{", indent(depth), el.tag_name));
    emit_attrs_and_text(lines, el.attributes.iter(), el.text_content.as_deref(), depth + 1);
    for child in &el.children {
        emit_node(lines, child, depth + 1, options);
    }
    lines.push(format!("{}}}", indent(depth)));
}

fn emit_instance(lines: &mut Vec<String>, inst: &InstanceNode, depth: usize, options: &EmitOptions) {
    lines.push(format!("{}{} {{", indent(depth), inst.component_id));
    emit_attrs_and_text(
        lines,
        inst.attributes.iter(),
        inst.text_content.as_deref(),
        depth + 1,
    );
    for child in &inst.children {
        emit_node(lines, child, depth + 1, options);
    }
    for slot in &inst.slots {
        emit_node(lines, slot, depth + 1, options);
    }
    lines.push(format!("{}}}", indent(depth)));
}

fn emit_slot(lines: &mut Vec<String>, slot: &SlotNode, depth: usize, options: &EmitOptions) {
    // The default slot's content re-routes by itself; named slots come
    // back as the wrapper-block shorthand.
    if slot.name == "default" {
        for child in &slot.children {
            emit_node(lines, child, depth, options);
        }
        return;
    }
    lines.push(format!("{}{} {{", indent(depth), slot.name));
    for child in &slot.children {
        emit_node(lines, child, depth + 1, options);
    }
    lines.push(format!("{}}}", indent(depth)));
}

fn emit_attrs_and_text<'a>(
    lines: &mut Vec<String>,
    attrs: impl Iterator<Item = (&'a str, &'a str)>,
    text_content: Option<&str>,
    depth: usize,
) {
    for (name, value) in attrs {
        lines.push(format!("{}{}: \"{}\"", indent(depth), name, escape(value)));
    }
    if let Some(text) = text_content {
        lines.push(format!("{}\"{}\"", indent(depth), escape(text)));
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LifecycleScript;
    use crate::node::{NodeMeta, ScriptRuleNode};

    #[test]
    fn test_clean_document_round_trips_exactly() {
        let source = "div {\n  // comment survives\n  id: \"x\"\n}";
        let mut doc = Document::new();
        doc.meta.original_source = Some(source.to_string());
        let payload = to_dsl_text(&doc);
        assert_eq!(payload, source);
    }

    #[test]
    fn test_dirty_root_falls_back_to_nodes() {
        let mut doc = Document::new();
        doc.meta.original_source = Some("original text".to_string());
        doc.meta.dirty = true;
        let mut el = match Node::element("div") {
            Node::Element(el) => el,
            _ => unreachable!(),
        };
        el.meta = NodeMeta::with_source("div { id: \"x\" }", (0, 15));
        doc.push_node(Node::Element(el));
        // Clean node under a dirty root still splices its slice.
        assert_eq!(to_dsl_text(&doc), "div { id: \"x\" }");
    }

    #[test]
    fn test_canonical_element() {
        let mut el = match Node::element("div") {
            Node::Element(el) => el,
            _ => unreachable!(),
        };
        el.attributes.set("id", "main");
        el.text_content = Some("hi there".to_string());
        el.children.push(Node::text("tail"));
        let mut doc = Document::new();
        doc.push_node(Node::Element(el));
        doc.meta.dirty = true;
        assert_eq!(
            to_dsl_text(&doc),
            "div {\n  id: \"main\"\n  \"hi there\"\n  text { \"tail\" }\n}"
        );
    }

    #[test]
    fn test_dirty_document_keeps_lifecycle_and_doc_rules() {
        let mut doc = Document::new();
        doc.meta.dirty = true;
        doc.meta.lifecycle_scripts.push(LifecycleScript {
            name: "onconnect".to_string(),
            body: "boot()".to_string(),
        });
        doc.push_script_rule(ScriptRuleNode {
            selector: String::new(),
            event: "click".to_string(),
            body: "go()".to_string(),
            ..ScriptRuleNode::default()
        });
        doc.push_script_rule(ScriptRuleNode {
            selector: "#save".to_string(),
            event: "click".to_string(),
            body: "persist()".to_string(),
            ..ScriptRuleNode::default()
        });
        doc.push_node(Node::element("div"));
        // The sheet-fed rule (selector "#save") stays out of the text.
        assert_eq!(
            to_dsl_text(&doc),
            "onconnect { boot() }\nonclick { go() }\ndiv { }"
        );
    }

    #[test]
    fn test_preserve_can_be_disabled() {
        let mut doc = Document::new();
        doc.meta.original_source = Some("whatever".to_string());
        doc.push_node(Node::element("span"));
        let canonical = to_dsl_text_with(
            &doc,
            &EmitOptions {
                preserve_original: false,
            },
        );
        assert_eq!(canonical, "span { }");
    }

    #[test]
    fn test_definition_emission() {
        let mut def = match Node::definition("card", DefinitionType::Component) {
            Node::ComponentDefinition(def) => def,
            _ => unreachable!(),
        };
        def.template.push(Node::element("header"));
        def.methods.push(crate::node::MethodDef {
            name: "greet".to_string(),
            params: vec!["name".to_string()],
            body: "return name".to_string(),
        });
        def.hooks.push(crate::node::HookDef {
            name: "onconnect".to_string(),
            body: "setup()".to_string(),
        });
        let mut doc = Document::new();
        doc.meta.dirty = true;
        doc.push_node(Node::ComponentDefinition(def));
        assert_eq!(
            to_dsl_text(&doc),
            "q-component card {\n  header { }\n  function greet(name) { return name }\n  onconnect { setup() }\n}"
        );
    }

    #[test]
    fn test_instance_slots() {
        let mut inst = InstanceNode {
            component_id: "card".to_string(),
            ..InstanceNode::default()
        };
        let mut named = SlotNode {
            name: "header".to_string(),
            ..SlotNode::default()
        };
        named.children.push(Node::text("title"));
        let mut default = SlotNode::default();
        default.children.push(Node::element("p"));
        inst.slots.push(Node::Slot(named));
        inst.slots.push(Node::Slot(default));
        let mut doc = Document::new();
        doc.meta.dirty = true;
        doc.push_node(Node::ComponentInstance(inst));
        assert_eq!(
            to_dsl_text(&doc),
            "card {\n  header {\n    text { \"title\" }\n  }\n  p { }\n}"
        );
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
