//! Canonical byte encoding of a document.
//!
//! First stage of persistence: the tree is flattened to a
//! length-prefixed byte stream with one tag byte per node, varint
//! string lengths and sequence counts, and presence bytes for optional
//! fields. The stream is deterministic so equal trees encode to equal
//! bytes.

use crate::document::{Document, DocumentMeta, LifecycleScript};
use crate::node::{
    AttrMap, ChainMode, DefinitionNode, DefinitionType, ElementNode, HookDef, InstanceNode,
    MethodDef, Node, NodeMeta, RawHtmlNode, ScriptRuleNode, SlotNode, TextNode,
};

/// Bumped on any layout change; decode rejects other versions.
pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("byte stream ended early")]
    Truncated,

    #[error("corrupt byte stream: {0}")]
    Corrupt(&'static str),
}

/// Node tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum NodeTag {
    Element = 1,
    Text = 2,
    RawHtml = 3,
    ComponentDefinition = 4,
    ComponentInstance = 5,
    TemplateInstance = 6,
    Slot = 7,
    ScriptRule = 8,
}

impl TryFrom<u8> for NodeTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Element),
            2 => Ok(Self::Text),
            3 => Ok(Self::RawHtml),
            4 => Ok(Self::ComponentDefinition),
            5 => Ok(Self::ComponentInstance),
            6 => Ok(Self::TemplateInstance),
            7 => Ok(Self::Slot),
            8 => Ok(Self::ScriptRule),
            _ => Err(()),
        }
    }
}

pub fn encode_document(doc: &Document) -> Vec<u8> {
    let mut w = ByteWriter::default();
    w.byte(FORMAT_VERSION);
    encode_doc_meta(&mut w, &doc.meta);
    encode_nodes(&mut w, &doc.nodes);
    encode_nodes(&mut w, &doc.script_rules);
    w.buf
}

pub fn decode_document(bytes: &[u8]) -> Result<Document, DecodeError> {
    let mut r = ByteReader::new(bytes);
    let version = r.byte()?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::Corrupt("unsupported format version"));
    }
    let meta = decode_doc_meta(&mut r)?;
    let nodes = decode_nodes(&mut r)?;
    let script_rules = decode_nodes(&mut r)?;
    if !r.is_eof() {
        return Err(DecodeError::Corrupt("trailing bytes after document"));
    }
    Ok(Document {
        nodes,
        script_rules,
        meta,
    })
}

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn boolean(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    fn varint(&mut self, value: usize) {
        let mut v = value;
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    fn string(&mut self, s: &str) {
        self.varint(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn opt_string(&mut self, s: &Option<String>) {
        match s {
            Some(s) => {
                self.byte(1);
                self.string(s);
            }
            None => self.byte(0),
        }
    }

    fn strings(&mut self, items: &[String]) {
        self.varint(items.len());
        for item in items {
            self.string(item);
        }
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn is_eof(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.offset)
            .ok_or(DecodeError::Truncated)?;
        self.offset += 1;
        Ok(byte)
    }

    fn boolean(&mut self) -> Result<bool, DecodeError> {
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::Corrupt("bad boolean byte")),
        }
    }

    fn varint(&mut self) -> Result<usize, DecodeError> {
        let mut result = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.byte()?;
            if shift > usize::BITS - 7 {
                return Err(DecodeError::Corrupt("varint too long"));
            }
            result |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(result)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.varint()?;
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::Truncated)?;
        let bytes = self.bytes[self.offset..end].to_vec();
        self.offset = end;
        String::from_utf8(bytes).map_err(|_| DecodeError::Corrupt("string is not utf-8"))
    }

    fn opt_string(&mut self) -> Result<Option<String>, DecodeError> {
        match self.byte()? {
            0 => Ok(None),
            1 => Ok(Some(self.string()?)),
            _ => Err(DecodeError::Corrupt("bad presence byte")),
        }
    }

    fn strings(&mut self) -> Result<Vec<String>, DecodeError> {
        let count = self.varint()?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(self.string()?);
        }
        Ok(items)
    }
}

fn encode_nodes(w: &mut ByteWriter, nodes: &[Node]) {
    w.varint(nodes.len());
    for node in nodes {
        encode_node(w, node);
    }
}

fn decode_nodes(r: &mut ByteReader<'_>) -> Result<Vec<Node>, DecodeError> {
    let count = r.varint()?;
    let mut nodes = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        nodes.push(decode_node(r)?);
    }
    Ok(nodes)
}

fn encode_node(w: &mut ByteWriter, node: &Node) {
    match node {
        Node::Element(el) => {
            w.byte(NodeTag::Element as u8);
            w.string(&el.tag_name);
            encode_attrs(w, &el.attributes);
            encode_nodes(w, &el.children);
            w.opt_string(&el.text_content);
            w.strings(&el.selector_chain);
            w.byte(chain_mode_byte(el.chain_mode));
            encode_meta(w, &el.meta);
        }
        Node::Text(text) => {
            w.byte(NodeTag::Text as u8);
            w.string(&text.value);
            encode_meta(w, &text.meta);
        }
        Node::RawHtml(raw) => {
            w.byte(NodeTag::RawHtml as u8);
            w.string(&raw.html);
            encode_meta(w, &raw.meta);
        }
        Node::ComponentDefinition(def) => {
            w.byte(NodeTag::ComponentDefinition as u8);
            w.string(&def.component_id);
            w.byte(match def.definition_type {
                DefinitionType::Component => 0,
                DefinitionType::Template => 1,
            });
            encode_nodes(w, &def.template);
            w.varint(def.methods.len());
            for method in &def.methods {
                w.string(&method.name);
                w.strings(&method.params);
                w.string(&method.body);
            }
            w.varint(def.hooks.len());
            for hook in &def.hooks {
                w.string(&hook.name);
                w.string(&hook.body);
            }
            encode_meta(w, &def.meta);
        }
        Node::ComponentInstance(inst) => {
            w.byte(NodeTag::ComponentInstance as u8);
            encode_instance(w, inst);
        }
        Node::TemplateInstance(inst) => {
            w.byte(NodeTag::TemplateInstance as u8);
            encode_instance(w, inst);
        }
        Node::Slot(slot) => {
            w.byte(NodeTag::Slot as u8);
            w.string(&slot.name);
            encode_nodes(w, &slot.children);
            encode_meta(w, &slot.meta);
        }
        Node::ScriptRule(rule) => {
            w.byte(NodeTag::ScriptRule as u8);
            w.string(&rule.selector);
            w.string(&rule.event);
            w.string(&rule.body);
            encode_meta(w, &rule.meta);
        }
    }
}

fn decode_node(r: &mut ByteReader<'_>) -> Result<Node, DecodeError> {
    let tag = NodeTag::try_from(r.byte()?)
        .map_err(|_| DecodeError::Corrupt("unknown node tag byte"))?;
    Ok(match tag {
        NodeTag::Element => Node::Element(ElementNode {
            tag_name: r.string()?,
            attributes: decode_attrs(r)?,
            children: decode_nodes(r)?,
            text_content: r.opt_string()?,
            selector_chain: r.strings()?,
            chain_mode: chain_mode_from(r.byte()?)?,
            meta: decode_meta(r)?,
        }),
        NodeTag::Text => Node::Text(TextNode {
            value: r.string()?,
            meta: decode_meta(r)?,
        }),
        NodeTag::RawHtml => Node::RawHtml(RawHtmlNode {
            html: r.string()?,
            meta: decode_meta(r)?,
        }),
        NodeTag::ComponentDefinition => Node::ComponentDefinition(DefinitionNode {
            component_id: r.string()?,
            definition_type: match r.byte()? {
                0 => DefinitionType::Component,
                1 => DefinitionType::Template,
                _ => return Err(DecodeError::Corrupt("bad definition type byte")),
            },
            template: decode_nodes(r)?,
            methods: {
                let count = r.varint()?;
                let mut methods = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    methods.push(MethodDef {
                        name: r.string()?,
                        params: r.strings()?,
                        body: r.string()?,
                    });
                }
                methods
            },
            hooks: {
                let count = r.varint()?;
                let mut hooks = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    hooks.push(HookDef {
                        name: r.string()?,
                        body: r.string()?,
                    });
                }
                hooks
            },
            meta: decode_meta(r)?,
        }),
        NodeTag::ComponentInstance => Node::ComponentInstance(decode_instance(r)?),
        NodeTag::TemplateInstance => Node::TemplateInstance(decode_instance(r)?),
        NodeTag::Slot => Node::Slot(SlotNode {
            name: r.string()?,
            children: decode_nodes(r)?,
            meta: decode_meta(r)?,
        }),
        NodeTag::ScriptRule => Node::ScriptRule(ScriptRuleNode {
            selector: r.string()?,
            event: r.string()?,
            body: r.string()?,
            meta: decode_meta(r)?,
        }),
    })
}

fn encode_instance(w: &mut ByteWriter, inst: &InstanceNode) {
    w.string(&inst.component_id);
    encode_attrs(w, &inst.attributes);
    encode_nodes(w, &inst.children);
    w.opt_string(&inst.text_content);
    encode_nodes(w, &inst.slots);
    encode_meta(w, &inst.meta);
}

fn decode_instance(r: &mut ByteReader<'_>) -> Result<InstanceNode, DecodeError> {
    Ok(InstanceNode {
        component_id: r.string()?,
        attributes: decode_attrs(r)?,
        children: decode_nodes(r)?,
        text_content: r.opt_string()?,
        slots: decode_nodes(r)?,
        meta: decode_meta(r)?,
    })
}

fn encode_attrs(w: &mut ByteWriter, attrs: &AttrMap) {
    w.varint(attrs.len());
    for (name, value) in attrs.iter() {
        w.string(name);
        w.string(value);
    }
}

fn decode_attrs(r: &mut ByteReader<'_>) -> Result<AttrMap, DecodeError> {
    let count = r.varint()?;
    let mut attrs = AttrMap::new();
    for _ in 0..count {
        let name = r.string()?;
        let value = r.string()?;
        attrs.set(name, value);
    }
    Ok(attrs)
}

fn encode_meta(w: &mut ByteWriter, meta: &NodeMeta) {
    w.boolean(meta.dirty);
    w.opt_string(&meta.original_source);
    match meta.source_range {
        Some((start, end)) => {
            w.byte(1);
            w.varint(start);
            w.varint(end);
        }
        None => w.byte(0),
    }
}

fn decode_meta(r: &mut ByteReader<'_>) -> Result<NodeMeta, DecodeError> {
    Ok(NodeMeta {
        dirty: r.boolean()?,
        original_source: r.opt_string()?,
        source_range: decode_range(r)?,
    })
}

fn decode_range(r: &mut ByteReader<'_>) -> Result<Option<(usize, usize)>, DecodeError> {
    match r.byte()? {
        0 => Ok(None),
        1 => Ok(Some((r.varint()?, r.varint()?))),
        _ => Err(DecodeError::Corrupt("bad presence byte")),
    }
}

fn encode_doc_meta(w: &mut ByteWriter, meta: &DocumentMeta) {
    w.boolean(meta.dirty);
    w.opt_string(&meta.original_source);
    match meta.source_range {
        Some((start, end)) => {
            w.byte(1);
            w.varint(start);
            w.varint(end);
        }
        None => w.byte(0),
    }
    w.opt_string(&meta.resolved_source);
    w.opt_string(&meta.rewritten_source);
    w.opt_string(&meta.evaluated_source);
    w.strings(&meta.imports);
    w.strings(&meta.q_rewrites);
    w.varint(meta.lifecycle_scripts.len());
    for script in &meta.lifecycle_scripts {
        w.string(&script.name);
        w.string(&script.body);
    }
}

fn decode_doc_meta(r: &mut ByteReader<'_>) -> Result<DocumentMeta, DecodeError> {
    Ok(DocumentMeta {
        dirty: r.boolean()?,
        original_source: r.opt_string()?,
        source_range: decode_range(r)?,
        resolved_source: r.opt_string()?,
        rewritten_source: r.opt_string()?,
        evaluated_source: r.opt_string()?,
        imports: r.strings()?,
        q_rewrites: r.strings()?,
        lifecycle_scripts: {
            let count = r.varint()?;
            let mut scripts = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                scripts.push(LifecycleScript {
                    name: r.string()?,
                    body: r.string()?,
                });
            }
            scripts
        },
    })
}

fn chain_mode_byte(mode: ChainMode) -> u8 {
    match mode {
        ChainMode::Single => 0,
        ChainMode::ClassShorthand => 1,
        ChainMode::Nest => 2,
    }
}

fn chain_mode_from(byte: u8) -> Result<ChainMode, DecodeError> {
    match byte {
        0 => Ok(ChainMode::Single),
        1 => Ok(ChainMode::ClassShorthand),
        2 => Ok(ChainMode::Nest),
        _ => Err(DecodeError::Corrupt("bad chain mode byte")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich_document() -> Document {
        let mut doc = Document::new();
        doc.meta.original_source = Some("div { }".to_string());
        doc.meta.imports.push("lib.qhtml".to_string());
        doc.meta.lifecycle_scripts.push(LifecycleScript {
            name: "onconnect".to_string(),
            body: "init()".to_string(),
        });

        let mut el = ElementNode {
            tag_name: "div".to_string(),
            ..ElementNode::default()
        };
        el.attributes.set("id", "main");
        el.attributes.set("class", "card wide");
        el.text_content = Some("hello".to_string());
        el.selector_chain = vec!["a".to_string(), "div".to_string()];
        el.chain_mode = ChainMode::ClassShorthand;
        el.children.push(Node::text("child"));
        el.meta = NodeMeta::with_source("div { }", (0, 7));
        doc.push_node(Node::Element(el));

        let mut def = match Node::definition("card", DefinitionType::Component) {
            Node::ComponentDefinition(def) => def,
            _ => unreachable!(),
        };
        def.template.push(Node::element("header"));
        def.methods.push(MethodDef {
            name: "greet".to_string(),
            params: vec!["name".to_string()],
            body: "return name".to_string(),
        });
        def.hooks.push(HookDef {
            name: "onconnect".to_string(),
            body: "setup()".to_string(),
        });
        doc.push_node(Node::ComponentDefinition(def));

        let mut inst = InstanceNode {
            component_id: "card".to_string(),
            ..InstanceNode::default()
        };
        let mut slot = SlotNode::default();
        slot.children.push(Node::raw_html("<b>hi</b>"));
        inst.slots.push(Node::Slot(slot));
        doc.push_node(Node::ComponentInstance(inst));

        doc.push_script_rule(ScriptRuleNode {
            selector: "#main".to_string(),
            event: "click".to_string(),
            body: "toggle()".to_string(),
            meta: NodeMeta::default(),
        });
        doc
    }

    #[test]
    fn test_round_trip_rich_document() {
        let doc = rich_document();
        let bytes = encode_document(&doc);
        let decoded = decode_document(&bytes).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_round_trip_empty_document() {
        let doc = Document::new();
        let decoded = decode_document(&encode_document(&doc)).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_varint_boundaries() {
        for value in [0usize, 1, 127, 128, 255, 300, 16_384, 1 << 20] {
            let mut w = ByteWriter::default();
            w.varint(value);
            let mut r = ByteReader::new(&w.buf);
            assert_eq!(r.varint().unwrap(), value);
            assert!(r.is_eof());
        }
    }

    #[test]
    fn test_truncated_stream() {
        let doc = rich_document();
        let bytes = encode_document(&doc);
        let err = decode_document(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated);
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = encode_document(&Document::new());
        bytes[0] = 99;
        assert!(matches!(
            decode_document(&bytes).unwrap_err(),
            DecodeError::Corrupt(_)
        ));
    }

    #[test]
    fn test_unknown_tag_byte() {
        let mut doc = Document::new();
        doc.push_node(Node::text("x"));
        let mut bytes = encode_document(&doc);
        // Locate the tag byte of the first node: version + meta + count.
        let meta_len = {
            let mut w = ByteWriter::default();
            encode_doc_meta(&mut w, &doc.meta);
            w.buf.len()
        };
        bytes[1 + meta_len + 1] = 0xEE;
        assert!(matches!(
            decode_document(&bytes).unwrap_err(),
            DecodeError::Corrupt("unknown node tag byte")
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_document(&Document::new());
        bytes.push(0);
        assert!(matches!(
            decode_document(&bytes).unwrap_err(),
            DecodeError::Corrupt("trailing bytes after document")
        ));
    }
}
