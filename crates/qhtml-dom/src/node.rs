//! Typed model-tree nodes.
//!
//! Every node is a plain serializable record carrying a `kind`
//! discriminator and a `meta` record. The factory constructors here are
//! the only way external collaborators are expected to build nodes for
//! programmatic tree surgery; the tree builder uses them too.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Per-node bookkeeping shared by every variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    /// Flips to true on the first tracked mutation of the node.
    #[serde(default)]
    pub dirty: bool,
    /// Exact source slice the node was built from, when known.
    #[serde(default)]
    pub original_source: Option<String>,
    /// Byte range of the slice in the parsed text.
    #[serde(default)]
    pub source_range: Option<(usize, usize)>,
}

impl NodeMeta {
    pub fn with_source(source: &str, range: (usize, usize)) -> Self {
        Self {
            dirty: false,
            original_source: Some(source.to_string()),
            source_range: Some(range),
        }
    }
}

/// String-keyed attribute map preserving insertion order.
///
/// Attribute order matters for faithful re-emission, so this is a thin
/// ordered pair list rather than a hash map; attribute counts in real
/// documents are small.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrMap {
    entries: Vec<(String, String)>,
}

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace; replacement keeps the original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append `value` to an existing entry with a separator, or insert it.
    pub fn merge(&mut self, name: &str, value: &str, separator: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => {
                if !entry.1.is_empty() {
                    entry.1.push_str(separator);
                }
                entry.1.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttrMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AttrMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl Serialize for AttrMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttrMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttrMapVisitor;

        impl<'de> Visitor<'de> for AttrMapVisitor {
            type Value = AttrMap;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a string-to-string attribute map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AttrMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    entries.push((k, v));
                }
                Ok(AttrMap { entries })
            }
        }

        deserializer.deserialize_map(AttrMapVisitor)
    }
}

/// How a compound selector was interpreted (see `selector_chain`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainMode {
    #[default]
    Single,
    /// All but the last token became classes on one element.
    ClassShorthand,
    /// Each token but the last became an anonymous wrapper element.
    Nest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionType {
    Component,
    Template,
}

/// A `function name(params){ body }` inside a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub body: String,
}

/// A lifecycle hook inside a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookDef {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag_name: String,
    #[serde(default)]
    pub attributes: AttrMap,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Direct text content from bare words, distinct from Text children.
    #[serde(default)]
    pub text_content: Option<String>,
    /// Selector tokens this element was parsed from.
    #[serde(default)]
    pub selector_chain: Vec<String>,
    #[serde(default)]
    pub chain_mode: ChainMode,
    #[serde(default)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
    #[serde(default)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHtmlNode {
    pub html: String,
    #[serde(default)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionNode {
    pub component_id: String,
    pub definition_type: DefinitionType,
    #[serde(default)]
    pub template: Vec<Node>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub hooks: Vec<HookDef>,
    #[serde(default)]
    pub meta: NodeMeta,
}

/// A component or template invocation with slot-split content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceNode {
    pub component_id: String,
    #[serde(default)]
    pub attributes: AttrMap,
    /// Children not routed to any slot.
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub text_content: Option<String>,
    /// Slot nodes in declaration order; at most one per name.
    #[serde(default)]
    pub slots: Vec<Node>,
    #[serde(default)]
    pub meta: NodeMeta,
}

impl InstanceNode {
    /// The slot with the given name, if one was supplied.
    pub fn slot(&self, name: &str) -> Option<&SlotNode> {
        self.slots.iter().find_map(|node| match node {
            Node::Slot(slot) if slot.name == name => Some(slot),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotNode {
    pub name: String,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub meta: NodeMeta,
}

impl Default for SlotNode {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            children: Vec::new(),
            meta: NodeMeta::default(),
        }
    }
}

/// A standalone `selector.on("event"): { body }` rule. Lives in the
/// document's rule sequence, never in a child sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRuleNode {
    pub selector: String,
    pub event: String,
    pub body: String,
    #[serde(default)]
    pub meta: NodeMeta,
}

/// Any node of the model tree. Serialized form is internally tagged by
/// `kind` with camelCase variant names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    RawHtml(RawHtmlNode),
    ComponentDefinition(DefinitionNode),
    ComponentInstance(InstanceNode),
    TemplateInstance(InstanceNode),
    Slot(SlotNode),
    ScriptRule(ScriptRuleNode),
}

impl Node {
    pub fn element(tag_name: impl Into<String>) -> Node {
        Node::Element(ElementNode {
            tag_name: tag_name.into(),
            ..ElementNode::default()
        })
    }

    pub fn text(value: impl Into<String>) -> Node {
        Node::Text(TextNode {
            value: value.into(),
            meta: NodeMeta::default(),
        })
    }

    pub fn raw_html(html: impl Into<String>) -> Node {
        Node::RawHtml(RawHtmlNode {
            html: html.into(),
            meta: NodeMeta::default(),
        })
    }

    pub fn slot(name: impl Into<String>) -> Node {
        Node::Slot(SlotNode {
            name: name.into(),
            ..SlotNode::default()
        })
    }

    pub fn definition(component_id: impl Into<String>, definition_type: DefinitionType) -> Node {
        Node::ComponentDefinition(DefinitionNode {
            component_id: component_id.into(),
            definition_type,
            template: Vec::new(),
            methods: Vec::new(),
            hooks: Vec::new(),
            meta: NodeMeta::default(),
        })
    }

    pub fn script_rule(
        selector: impl Into<String>,
        event: impl Into<String>,
        body: impl Into<String>,
    ) -> Node {
        Node::ScriptRule(ScriptRuleNode {
            selector: selector.into(),
            event: event.into(),
            body: body.into(),
            meta: NodeMeta::default(),
        })
    }

    /// The `kind` discriminator as it appears in serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Element(_) => "element",
            Node::Text(_) => "text",
            Node::RawHtml(_) => "rawHtml",
            Node::ComponentDefinition(_) => "componentDefinition",
            Node::ComponentInstance(_) => "componentInstance",
            Node::TemplateInstance(_) => "templateInstance",
            Node::Slot(_) => "slot",
            Node::ScriptRule(_) => "scriptRule",
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Element(n) => &n.meta,
            Node::Text(n) => &n.meta,
            Node::RawHtml(n) => &n.meta,
            Node::ComponentDefinition(n) => &n.meta,
            Node::ComponentInstance(n) | Node::TemplateInstance(n) => &n.meta,
            Node::Slot(n) => &n.meta,
            Node::ScriptRule(n) => &n.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Node::Element(n) => &mut n.meta,
            Node::Text(n) => &mut n.meta,
            Node::RawHtml(n) => &mut n.meta,
            Node::ComponentDefinition(n) => &mut n.meta,
            Node::ComponentInstance(n) | Node::TemplateInstance(n) => &mut n.meta,
            Node::Slot(n) => &mut n.meta,
            Node::ScriptRule(n) => &mut n.meta,
        }
    }

    /// Direct child sequence, if this variant has one. Definition nodes
    /// expose their template body here.
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Element(n) => Some(&n.children),
            Node::ComponentInstance(n) | Node::TemplateInstance(n) => Some(&n.children),
            Node::ComponentDefinition(n) => Some(&n.template),
            Node::Slot(n) => Some(&n.children),
            Node::Text(_) | Node::RawHtml(_) | Node::ScriptRule(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element(n) => Some(&mut n.children),
            Node::ComponentInstance(n) | Node::TemplateInstance(n) => Some(&mut n.children),
            Node::ComponentDefinition(n) => Some(&mut n.template),
            Node::Slot(n) => Some(&mut n.children),
            Node::Text(_) | Node::RawHtml(_) | Node::ScriptRule(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Node::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_slot(&self) -> Option<&SlotNode> {
        match self {
            Node::Slot(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceNode> {
        match self {
            Node::ComponentInstance(n) | Node::TemplateInstance(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_definition(&self) -> Option<&DefinitionNode> {
        match self {
            Node::ComponentDefinition(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_map_preserves_insertion_order() {
        let mut attrs = AttrMap::new();
        attrs.set("z", "1");
        attrs.set("a", "2");
        attrs.set("z", "3");
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(attrs.get("z"), Some("3"));
    }

    #[test]
    fn test_attr_map_merge() {
        let mut attrs = AttrMap::new();
        attrs.merge("class", "card", " ");
        attrs.merge("class", "wide", " ");
        assert_eq!(attrs.get("class"), Some("card wide"));
    }

    #[test]
    fn test_kind_discriminators() {
        assert_eq!(Node::element("div").kind(), "element");
        assert_eq!(Node::text("x").kind(), "text");
        assert_eq!(Node::raw_html("<b/>").kind(), "rawHtml");
        assert_eq!(
            Node::definition("card", DefinitionType::Component).kind(),
            "componentDefinition"
        );
        assert_eq!(Node::slot("title").kind(), "slot");
        assert_eq!(Node::script_rule("div", "click", "go()").kind(), "scriptRule");
    }

    #[test]
    fn test_node_json_shape() {
        let mut element = ElementNode {
            tag_name: "div".into(),
            ..ElementNode::default()
        };
        element.attributes.set("id", "x");
        element.children.push(Node::text("hi"));
        let json = serde_json::to_value(Node::Element(element)).unwrap();
        assert_eq!(json["kind"], "element");
        assert_eq!(json["tagName"], "div");
        assert_eq!(json["attributes"]["id"], "x");
        assert_eq!(json["children"][0]["kind"], "text");
        assert_eq!(json["children"][0]["value"], "hi");
        assert_eq!(json["meta"]["dirty"], false);
    }

    #[test]
    fn test_node_json_round_trip() {
        let mut element = ElementNode {
            tag_name: "div".into(),
            text_content: Some("direct".into()),
            selector_chain: vec!["a".into(), "div".into()],
            chain_mode: ChainMode::ClassShorthand,
            ..ElementNode::default()
        };
        element.attributes.set("class", "a");
        let node = Node::Element(element);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_instance_slot_lookup() {
        let mut instance = InstanceNode {
            component_id: "card".into(),
            ..InstanceNode::default()
        };
        let mut slot = SlotNode {
            name: "title".into(),
            ..SlotNode::default()
        };
        slot.children.push(Node::text("hello"));
        instance.slots.push(Node::Slot(slot));
        assert!(instance.slot("title").is_some());
        assert!(instance.slot("body").is_none());
    }
}
