//! Document root and document-level metadata.

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::node::{Node, ScriptRuleNode};

/// A lifecycle hook collected from the top level of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleScript {
    pub name: String,
    pub body: String,
}

/// Document-level metadata: the dirty flag plus the source snapshots
/// recorded by each compiler stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default)]
    pub dirty: bool,
    /// Raw source text exactly as handed to the compiler.
    #[serde(default)]
    pub original_source: Option<String>,
    #[serde(default)]
    pub source_range: Option<(usize, usize)>,
    /// Source after include resolution.
    #[serde(default)]
    pub resolved_source: Option<String>,
    /// Source after macro expansion.
    #[serde(default)]
    pub rewritten_source: Option<String>,
    /// Source after embedded-script evaluation; this is what was parsed.
    #[serde(default)]
    pub evaluated_source: Option<String>,
    /// Resolved URLs actually pulled in, in resolution order.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Names of the macros that were expanded.
    #[serde(default)]
    pub q_rewrites: Vec<String>,
    #[serde(default)]
    pub lifecycle_scripts: Vec<LifecycleScript>,
}

/// Root of a compiled model tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Top-level nodes in source order.
    pub nodes: Vec<Node>,
    /// Standalone event-binding rules; `ScriptRule` variants only.
    pub script_rules: Vec<Node>,
    pub meta: DocumentMeta,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn push_script_rule(&mut self, rule: ScriptRuleNode) {
        self.script_rules.push(Node::ScriptRule(rule));
    }

    /// Typed view over the rule sequence.
    pub fn script_rules(&self) -> impl Iterator<Item = &ScriptRuleNode> {
        self.script_rules.iter().filter_map(|node| match node {
            Node::ScriptRule(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.meta.dirty = true;
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Document", 4)?;
        state.serialize_field("kind", "document")?;
        state.serialize_field("nodes", &self.nodes)?;
        state.serialize_field("scriptRules", &self.script_rules)?;
        state.serialize_field("meta", &self.meta)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repr {
            kind: Option<String>,
            #[serde(default)]
            nodes: Vec<Node>,
            #[serde(default)]
            script_rules: Vec<Node>,
            #[serde(default)]
            meta: DocumentMeta,
        }

        let repr = Repr::deserialize(deserializer)?;
        if let Some(kind) = repr.kind {
            if kind != "document" {
                return Err(D::Error::custom(format!(
                    "expected kind 'document', got '{kind}'"
                )));
            }
        }
        Ok(Document {
            nodes: repr.nodes,
            script_rules: repr.script_rules,
            meta: repr.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_json_shape() {
        let mut doc = Document::new();
        doc.push_node(Node::element("div"));
        doc.push_script_rule(ScriptRuleNode {
            selector: "div".into(),
            event: "click".into(),
            body: "go()".into(),
            ..ScriptRuleNode::default()
        });
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["kind"], "document");
        assert_eq!(json["nodes"][0]["kind"], "element");
        assert_eq!(json["scriptRules"][0]["kind"], "scriptRule");
        assert_eq!(json["meta"]["dirty"], false);
    }

    #[test]
    fn test_document_json_round_trip() {
        let mut doc = Document::new();
        doc.push_node(Node::text("hi"));
        doc.meta.imports.push("a.qhtml".into());
        doc.meta.original_source = Some("text { \"hi\" }".into());
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_document_rejects_wrong_kind() {
        let err = serde_json::from_str::<Document>(r#"{"kind":"element"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_script_rules_view_skips_foreign_variants() {
        let mut doc = Document::new();
        doc.script_rules.push(Node::text("stray"));
        doc.push_script_rule(ScriptRuleNode::default());
        assert_eq!(doc.script_rules().count(), 1);
    }
}
