//! Definition-instance normalization.
//!
//! After the tree is built, elements whose tag names a known definition
//! are rewritten into typed instances, and the content supplied at the
//! call site is split across the slots the definition declares. Exactly
//! one slot node per name survives, in declaration order, with
//! same-name content merged in document order.

use std::collections::HashMap;

use qhtml_dom::{DefinitionNode, DefinitionType, Document, ElementNode, InstanceNode, Node, SlotNode};
use tracing::debug;

/// Rewrite definition invocations across the whole document in place.
pub fn normalize(doc: &mut Document) {
    let mut registry = HashMap::new();
    collect_definitions(&doc.nodes, &mut registry);
    if registry.is_empty() {
        return;
    }
    let mut rewrites = 0usize;
    let nodes = std::mem::take(&mut doc.nodes);
    doc.nodes = rewrite_sequence(nodes, &registry, &mut rewrites);
    if rewrites > 0 {
        debug!(
            rewrites,
            definitions = registry.len(),
            "normalized definition instances"
        );
    }
}

/// Definitions anywhere in the tree register by id, later ones winning.
/// Templates are not descended into; a definition nested inside another
/// one only registers once its owner is instantiated.
fn collect_definitions(nodes: &[Node], registry: &mut HashMap<String, DefinitionNode>) {
    for node in nodes {
        match node {
            Node::ComponentDefinition(def) => {
                registry.insert(def.component_id.clone(), def.clone());
            }
            _ => {
                if let Some(children) = node.children() {
                    collect_definitions(children, registry);
                }
            }
        }
    }
}

/// Slot names a definition's template declares, in declaration order.
fn declared_slots(def: &DefinitionNode) -> Vec<String> {
    let mut names = Vec::new();
    collect_slot_names(&def.template, &mut names);
    names
}

fn collect_slot_names(nodes: &[Node], names: &mut Vec<String>) {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.tag_name == "slot" {
                let name = el.attributes.get("name").unwrap_or("default");
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        if !matches!(node, Node::ComponentDefinition(_)) {
            if let Some(children) = node.children() {
                collect_slot_names(children, names);
            }
        }
    }
}

fn rewrite_sequence(
    nodes: Vec<Node>,
    registry: &HashMap<String, DefinitionNode>,
    rewrites: &mut usize,
) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| rewrite_node(node, registry, rewrites))
        .collect()
}

fn rewrite_node(
    node: Node,
    registry: &HashMap<String, DefinitionNode>,
    rewrites: &mut usize,
) -> Node {
    match node {
        Node::Element(el) => {
            if let Some(def) = registry.get(&el.tag_name) {
                *rewrites += 1;
                instantiate(el, def, registry, rewrites)
            } else {
                let mut el = el;
                el.children = rewrite_sequence(std::mem::take(&mut el.children), registry, rewrites);
                Node::Element(el)
            }
        }
        Node::ComponentInstance(inst) => {
            Node::ComponentInstance(rewrite_instance(inst, registry, rewrites))
        }
        Node::TemplateInstance(inst) => {
            Node::TemplateInstance(rewrite_instance(inst, registry, rewrites))
        }
        Node::Slot(mut slot) => {
            slot.children = rewrite_sequence(std::mem::take(&mut slot.children), registry, rewrites);
            Node::Slot(slot)
        }
        // Templates stay as written; text, raw HTML and rules have no
        // element children to rewrite.
        other => other,
    }
}

fn rewrite_instance(
    mut inst: InstanceNode,
    registry: &HashMap<String, DefinitionNode>,
    rewrites: &mut usize,
) -> InstanceNode {
    inst.children = rewrite_sequence(std::mem::take(&mut inst.children), registry, rewrites);
    inst.slots = rewrite_sequence(std::mem::take(&mut inst.slots), registry, rewrites);
    inst
}

/// Turn one invocation element into an instance, splitting its content
/// across the declared slots.
fn instantiate(
    element: ElementNode,
    def: &DefinitionNode,
    registry: &HashMap<String, DefinitionNode>,
    rewrites: &mut usize,
) -> Node {
    let declared = declared_slots(def);
    let mut instance = InstanceNode {
        component_id: def.component_id.clone(),
        attributes: element.attributes,
        children: Vec::new(),
        text_content: element.text_content,
        slots: Vec::new(),
        meta: element.meta,
    };

    if let [single] = declared.as_slice() {
        // A single declared slot absorbs everything, direct text included.
        let mut content = Vec::new();
        if let Some(text) = instance.text_content.take() {
            content.push(Node::text(text));
        }
        for child in element.children {
            content.push(rewrite_node(child, registry, rewrites));
        }
        if !content.is_empty() {
            instance.slots.push(Node::Slot(SlotNode {
                name: single.clone(),
                children: content,
                ..SlotNode::default()
            }));
        }
    } else {
        let mut routed: Vec<(String, Vec<Node>)> = declared
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for child in element.children {
            let child = rewrite_node(child, registry, rewrites);
            match route_child(child, &declared) {
                Routed::To(name, mut content) => {
                    if let Some((_, bucket)) = routed.iter_mut().find(|(n, _)| *n == name) {
                        bucket.append(&mut content);
                    }
                }
                Routed::Leftover(node) => instance.children.push(node),
            }
        }
        for (name, children) in routed {
            if !children.is_empty() {
                instance.slots.push(Node::Slot(SlotNode {
                    name,
                    children,
                    ..SlotNode::default()
                }));
            }
        }
    }

    match def.definition_type {
        DefinitionType::Component => Node::ComponentInstance(instance),
        DefinitionType::Template => Node::TemplateInstance(instance),
    }
}

enum Routed {
    To(String, Vec<Node>),
    Leftover(Node),
}

/// Where one supplied child goes: a `slot` attribute naming a declared
/// slot routes the child as-is; a child whose own tag names a declared
/// slot is unwrapped into it; everything else stays on the instance.
fn route_child(child: Node, declared: &[String]) -> Routed {
    match child {
        Node::Element(element) => {
            let slotted = match element.attributes.get("slot") {
                Some(target) if declared.iter().any(|n| n == target) => Some(target.to_string()),
                _ => None,
            };
            if let Some(name) = slotted {
                return Routed::To(name, vec![Node::Element(element)]);
            }
            if declared.iter().any(|n| *n == element.tag_name) {
                let mut content = Vec::new();
                if let Some(text) = element.text_content {
                    content.push(Node::text(text));
                }
                content.extend(element.children);
                return Routed::To(element.tag_name, content);
            }
            Routed::Leftover(Node::Element(element))
        }
        other => Routed::Leftover(other),
    }
}
