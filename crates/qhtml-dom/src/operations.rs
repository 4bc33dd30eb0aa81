//! Path-addressed access into a document.
//!
//! Mutation paths are arrays of string keys starting at the Document
//! root (`["nodes", "0", "attributes", "id"]`); a numeric key addresses
//! a sequence position. Writes go through a typed walk so the tree
//! never holds values of the wrong shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::document::{Document, DocumentMeta, LifecycleScript};
use crate::node::{
    AttrMap, ChainMode, DefinitionType, HookDef, MethodDef, Node, NodeMeta,
};

#[derive(Debug, thiserror::Error)]
pub enum MutateError {
    #[error("empty mutation path")]
    EmptyPath,

    #[error("kind is immutable")]
    ImmutableKind,

    #[error("unknown key '{key}' on {kind}")]
    UnknownKey { key: String, kind: &'static str },

    #[error("index '{segment}' out of bounds (len {len})")]
    BadIndex { segment: String, len: usize },

    #[error("cannot delete required field '{key}'")]
    CannotDelete { key: String },

    #[error("value has wrong shape for '{key}': {detail}")]
    BadValue { key: String, detail: String },
}

/// Outcome of an applied mutation.
#[derive(Debug, Clone)]
pub struct Applied {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// False when a set wrote a value equal to the previous one.
    pub changed: bool,
    /// Path of the node owning the mutated field; empty for the root.
    pub owner: Vec<String>,
}

enum Op {
    Set(Value),
    Delete,
}

/// Read the value at `path`, `None` when the path does not resolve.
pub fn get_path(doc: &Document, path: &[String]) -> Option<Value> {
    let mut value = serde_json::to_value(doc).ok()?;
    for segment in path {
        value = match value {
            Value::Object(mut map) => map.remove(segment.as_str())?,
            Value::Array(mut items) => {
                if segment == "length" {
                    Value::from(items.len())
                } else {
                    let idx: usize = segment.parse().ok()?;
                    if idx >= items.len() {
                        return None;
                    }
                    items.swap_remove(idx)
                }
            }
            _ => return None,
        };
    }
    Some(value)
}

pub fn set_path(doc: &mut Document, path: &[String], value: Value) -> Result<Applied, MutateError> {
    apply(doc, path, Op::Set(value))
}

pub fn delete_path(doc: &mut Document, path: &[String]) -> Result<Applied, MutateError> {
    apply(doc, path, Op::Delete)
}

/// The node addressed by `path`, which must end at a node position.
pub fn node_at<'a>(doc: &'a Document, path: &[String]) -> Option<&'a Node> {
    let mut iter = path.iter();
    let key = iter.next()?;
    let idx: usize = iter.next()?.parse().ok()?;
    let mut node = match key.as_str() {
        "nodes" => doc.nodes.get(idx),
        "scriptRules" => doc.script_rules.get(idx),
        _ => None,
    }?;
    loop {
        let Some(key) = iter.next() else {
            return Some(node);
        };
        let idx: usize = iter.next()?.parse().ok()?;
        node = match (node, key.as_str()) {
            (Node::Element(el), "children") => el.children.get(idx),
            (Node::ComponentInstance(inst) | Node::TemplateInstance(inst), "children") => {
                inst.children.get(idx)
            }
            (Node::ComponentInstance(inst) | Node::TemplateInstance(inst), "slots") => {
                inst.slots.get(idx)
            }
            (Node::ComponentDefinition(def), "template") => def.template.get(idx),
            (Node::Slot(slot), "children") => slot.children.get(idx),
            _ => None,
        }?;
    }
}

pub fn node_at_mut<'a>(doc: &'a mut Document, path: &[String]) -> Option<&'a mut Node> {
    let mut iter = path.iter();
    let key = iter.next()?;
    let idx: usize = iter.next()?.parse().ok()?;
    let mut node = match key.as_str() {
        "nodes" => doc.nodes.get_mut(idx),
        "scriptRules" => doc.script_rules.get_mut(idx),
        _ => None,
    }?;
    loop {
        let Some(key) = iter.next() else {
            return Some(node);
        };
        let idx: usize = iter.next()?.parse().ok()?;
        node = match (node, key.as_str()) {
            (Node::Element(el), "children") => el.children.get_mut(idx),
            (Node::ComponentInstance(inst) | Node::TemplateInstance(inst), "children") => {
                inst.children.get_mut(idx)
            }
            (Node::ComponentInstance(inst) | Node::TemplateInstance(inst), "slots") => {
                inst.slots.get_mut(idx)
            }
            (Node::ComponentDefinition(def), "template") => def.template.get_mut(idx),
            (Node::Slot(slot), "children") => slot.children.get_mut(idx),
            _ => None,
        }?;
    }
}

/// Mark the owning node (when `owner` is non-empty) and the root dirty.
pub fn mark_dirty_at(doc: &mut Document, owner: &[String]) {
    doc.meta.dirty = true;
    if !owner.is_empty() {
        if let Some(node) = node_at_mut(doc, owner) {
            node.meta_mut().dirty = true;
        }
    }
}

type Step = (Option<Value>, Option<Value>, bool);

fn apply(doc: &mut Document, path: &[String], op: Op) -> Result<Applied, MutateError> {
    let (head, rest) = path.split_first().ok_or(MutateError::EmptyPath)?;
    let mut owner_len = 0usize;
    let (old_value, new_value, changed) = match head.as_str() {
        "kind" => return Err(MutateError::ImmutableKind),
        "nodes" if rest.is_empty() => apply_clearable(&mut doc.nodes, head, op)?,
        "nodes" => seq_apply(&mut doc.nodes, rest, op, 1, &mut owner_len)?,
        "scriptRules" if rest.is_empty() => apply_clearable(&mut doc.script_rules, head, op)?,
        "scriptRules" => seq_apply(&mut doc.script_rules, rest, op, 1, &mut owner_len)?,
        "meta" if rest.is_empty() => apply_typed::<DocumentMeta>(&mut doc.meta, head, op)?,
        "meta" => doc_meta_apply(&mut doc.meta, rest, op)?,
        _ => {
            return Err(MutateError::UnknownKey {
                key: head.clone(),
                kind: "document",
            })
        }
    };
    Ok(Applied {
        old_value,
        new_value,
        changed,
        owner: path[..owner_len].to_vec(),
    })
}

fn parse_index(segment: &str, len: usize) -> Result<usize, MutateError> {
    segment.parse().map_err(|_| MutateError::BadIndex {
        segment: segment.to_string(),
        len,
    })
}

/// Walk into a node sequence; `path[0]` is the index, `base` the number
/// of full-path segments consumed before it.
fn seq_apply(
    seq: &mut Vec<Node>,
    path: &[String],
    op: Op,
    base: usize,
    owner_len: &mut usize,
) -> Result<Step, MutateError> {
    let Some((segment, rest)) = path.split_first() else {
        return Err(MutateError::EmptyPath);
    };
    let len = seq.len();
    let idx = parse_index(segment, len)?;
    if rest.is_empty() {
        return match op {
            Op::Set(value) => {
                let new: Node = from_value(value, segment)?;
                let new_value = serde_json::to_value(&new).ok();
                if idx < len {
                    let changed = seq[idx] != new;
                    let old = serde_json::to_value(&seq[idx]).ok();
                    seq[idx] = new;
                    Ok((old, new_value, changed))
                } else if idx == len {
                    seq.push(new);
                    Ok((None, new_value, true))
                } else {
                    Err(MutateError::BadIndex {
                        segment: segment.clone(),
                        len,
                    })
                }
            }
            Op::Delete => {
                if idx < len {
                    let old = serde_json::to_value(&seq[idx]).ok();
                    seq.remove(idx);
                    Ok((old, None, true))
                } else {
                    Err(MutateError::BadIndex {
                        segment: segment.clone(),
                        len,
                    })
                }
            }
        };
    }
    let node = seq.get_mut(idx).ok_or_else(|| MutateError::BadIndex {
        segment: segment.clone(),
        len,
    })?;
    *owner_len = base + 1;
    node_apply(node, rest, op, base + 1, owner_len)
}

fn node_apply(
    node: &mut Node,
    path: &[String],
    op: Op,
    base: usize,
    owner_len: &mut usize,
) -> Result<Step, MutateError> {
    let Some((key, rest)) = path.split_first() else {
        return Err(MutateError::EmptyPath);
    };
    if rest.is_empty() {
        return node_terminal(node, key, op);
    }
    let kind = node.kind();
    match key.as_str() {
        "meta" => meta_apply(node.meta_mut(), rest, op),
        "attributes" => {
            let attrs = match node {
                Node::Element(el) => &mut el.attributes,
                Node::ComponentInstance(inst) | Node::TemplateInstance(inst) => {
                    &mut inst.attributes
                }
                _ => {
                    return Err(MutateError::UnknownKey {
                        key: key.clone(),
                        kind,
                    })
                }
            };
            if rest.len() != 1 {
                return Err(MutateError::UnknownKey {
                    key: rest[1].clone(),
                    kind: "attributes",
                });
            }
            attr_apply(attrs, &rest[0], op)
        }
        "children" => {
            let children = match node {
                Node::Element(el) => &mut el.children,
                Node::ComponentInstance(inst) | Node::TemplateInstance(inst) => {
                    &mut inst.children
                }
                Node::Slot(slot) => &mut slot.children,
                _ => {
                    return Err(MutateError::UnknownKey {
                        key: key.clone(),
                        kind,
                    })
                }
            };
            seq_apply(children, rest, op, base + 1, owner_len)
        }
        "template" => match node {
            Node::ComponentDefinition(def) => {
                seq_apply(&mut def.template, rest, op, base + 1, owner_len)
            }
            _ => Err(MutateError::UnknownKey {
                key: key.clone(),
                kind,
            }),
        },
        "slots" => match node {
            Node::ComponentInstance(inst) | Node::TemplateInstance(inst) => {
                seq_apply(&mut inst.slots, rest, op, base + 1, owner_len)
            }
            _ => Err(MutateError::UnknownKey {
                key: key.clone(),
                kind,
            }),
        },
        "selectorChain" => match node {
            Node::Element(el) => item_seq_apply(&mut el.selector_chain, rest, "selectorChain", op),
            _ => Err(MutateError::UnknownKey {
                key: key.clone(),
                kind,
            }),
        },
        "methods" => match node {
            Node::ComponentDefinition(def) => {
                item_seq_apply(&mut def.methods, rest, "methods", op)
            }
            _ => Err(MutateError::UnknownKey {
                key: key.clone(),
                kind,
            }),
        },
        "hooks" => match node {
            Node::ComponentDefinition(def) => item_seq_apply(&mut def.hooks, rest, "hooks", op),
            _ => Err(MutateError::UnknownKey {
                key: key.clone(),
                kind,
            }),
        },
        _ => Err(MutateError::UnknownKey {
            key: key.clone(),
            kind,
        }),
    }
}

fn node_terminal(node: &mut Node, key: &str, op: Op) -> Result<Step, MutateError> {
    if key == "kind" {
        return Err(MutateError::ImmutableKind);
    }
    let kind = node.kind();
    match node {
        Node::Element(el) => match key {
            "tagName" => apply_typed(&mut el.tag_name, key, op),
            "attributes" => attrs_field_apply(&mut el.attributes, key, op),
            "textContent" => apply_optional(&mut el.text_content, key, op),
            "children" => apply_clearable(&mut el.children, key, op),
            "selectorChain" => apply_clearable(&mut el.selector_chain, key, op),
            "chainMode" => apply_typed(&mut el.chain_mode, key, op),
            "meta" => apply_typed(&mut el.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::Text(text) => match key {
            "value" => apply_typed(&mut text.value, key, op),
            "meta" => apply_typed(&mut text.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::RawHtml(raw) => match key {
            "html" => apply_typed(&mut raw.html, key, op),
            "meta" => apply_typed(&mut raw.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::ComponentDefinition(def) => match key {
            "componentId" => apply_typed(&mut def.component_id, key, op),
            "definitionType" => apply_typed::<DefinitionType>(&mut def.definition_type, key, op),
            "template" => apply_clearable(&mut def.template, key, op),
            "methods" => apply_clearable(&mut def.methods, key, op),
            "hooks" => apply_clearable(&mut def.hooks, key, op),
            "meta" => apply_typed(&mut def.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::ComponentInstance(inst) | Node::TemplateInstance(inst) => match key {
            "componentId" => apply_typed(&mut inst.component_id, key, op),
            "attributes" => attrs_field_apply(&mut inst.attributes, key, op),
            "textContent" => apply_optional(&mut inst.text_content, key, op),
            "children" => apply_clearable(&mut inst.children, key, op),
            "slots" => apply_clearable(&mut inst.slots, key, op),
            "meta" => apply_typed(&mut inst.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::Slot(slot) => match key {
            "name" => apply_typed(&mut slot.name, key, op),
            "children" => apply_clearable(&mut slot.children, key, op),
            "meta" => apply_typed(&mut slot.meta, key, op),
            _ => unknown(key, kind),
        },
        Node::ScriptRule(rule) => match key {
            "selector" => apply_typed(&mut rule.selector, key, op),
            "event" => apply_typed(&mut rule.event, key, op),
            "body" => apply_typed(&mut rule.body, key, op),
            "meta" => apply_typed(&mut rule.meta, key, op),
            _ => unknown(key, kind),
        },
    }
}

fn meta_apply(meta: &mut NodeMeta, rest: &[String], op: Op) -> Result<Step, MutateError> {
    if rest.len() != 1 {
        return Err(MutateError::UnknownKey {
            key: rest.join("."),
            kind: "meta",
        });
    }
    match rest[0].as_str() {
        "dirty" => apply_typed(&mut meta.dirty, "dirty", op),
        "originalSource" => apply_optional(&mut meta.original_source, "originalSource", op),
        "sourceRange" => apply_optional(&mut meta.source_range, "sourceRange", op),
        other => Err(MutateError::UnknownKey {
            key: other.to_string(),
            kind: "meta",
        }),
    }
}

fn doc_meta_apply(meta: &mut DocumentMeta, rest: &[String], op: Op) -> Result<Step, MutateError> {
    let Some((key, deeper)) = rest.split_first() else {
        return Err(MutateError::EmptyPath);
    };
    match key.as_str() {
        "dirty" if deeper.is_empty() => apply_typed(&mut meta.dirty, key, op),
        "originalSource" if deeper.is_empty() => {
            apply_optional(&mut meta.original_source, key, op)
        }
        "sourceRange" if deeper.is_empty() => apply_optional(&mut meta.source_range, key, op),
        "resolvedSource" if deeper.is_empty() => {
            apply_optional(&mut meta.resolved_source, key, op)
        }
        "rewrittenSource" if deeper.is_empty() => {
            apply_optional(&mut meta.rewritten_source, key, op)
        }
        "evaluatedSource" if deeper.is_empty() => {
            apply_optional(&mut meta.evaluated_source, key, op)
        }
        "imports" if deeper.is_empty() => apply_clearable(&mut meta.imports, key, op),
        "imports" => item_seq_apply(&mut meta.imports, deeper, "imports", op),
        "qRewrites" if deeper.is_empty() => apply_clearable(&mut meta.q_rewrites, key, op),
        "qRewrites" => item_seq_apply(&mut meta.q_rewrites, deeper, "qRewrites", op),
        "lifecycleScripts" if deeper.is_empty() => {
            apply_clearable(&mut meta.lifecycle_scripts, key, op)
        }
        "lifecycleScripts" => {
            item_seq_apply(&mut meta.lifecycle_scripts, deeper, "lifecycleScripts", op)
        }
        _ => Err(MutateError::UnknownKey {
            key: key.clone(),
            kind: "document meta",
        }),
    }
}

fn unknown(key: &str, kind: &'static str) -> Result<Step, MutateError> {
    Err(MutateError::UnknownKey {
        key: key.to_string(),
        kind,
    })
}

fn from_value<T: DeserializeOwned>(value: Value, key: &str) -> Result<T, MutateError> {
    serde_json::from_value(value).map_err(|e| MutateError::BadValue {
        key: key.to_string(),
        detail: e.to_string(),
    })
}

fn apply_typed<T>(field: &mut T, key: &str, op: Op) -> Result<Step, MutateError>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    match op {
        Op::Set(value) => {
            let new: T = from_value(value, key)?;
            let old = serde_json::to_value(&*field).ok();
            let new_value = serde_json::to_value(&new).ok();
            let changed = *field != new;
            *field = new;
            Ok((old, new_value, changed))
        }
        Op::Delete => Err(MutateError::CannotDelete {
            key: key.to_string(),
        }),
    }
}

fn apply_optional<T>(field: &mut Option<T>, key: &str, op: Op) -> Result<Step, MutateError>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let old = field
        .as_ref()
        .and_then(|v| serde_json::to_value(v).ok());
    match op {
        Op::Set(value) => {
            let new: Option<T> = from_value(value, key)?;
            let new_value = new.as_ref().and_then(|v| serde_json::to_value(v).ok());
            let changed = *field != new;
            *field = new;
            Ok((old, new_value, changed))
        }
        Op::Delete => {
            let changed = field.is_some();
            *field = None;
            Ok((old, None, changed))
        }
    }
}

/// Whole-collection writes; delete clears rather than failing, the
/// closest analogue of removing the property.
fn apply_clearable<T>(field: &mut Vec<T>, key: &str, op: Op) -> Result<Step, MutateError>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let old = serde_json::to_value(&*field).ok();
    match op {
        Op::Set(value) => {
            let new: Vec<T> = from_value(value, key)?;
            let new_value = serde_json::to_value(&new).ok();
            let changed = *field != new;
            *field = new;
            Ok((old, new_value, changed))
        }
        Op::Delete => {
            let changed = !field.is_empty();
            field.clear();
            Ok((old, None, changed))
        }
    }
}

fn attrs_field_apply(field: &mut AttrMap, key: &str, op: Op) -> Result<Step, MutateError> {
    let old = serde_json::to_value(&*field).ok();
    match op {
        Op::Set(value) => {
            let new: AttrMap = from_value(value, key)?;
            let new_value = serde_json::to_value(&new).ok();
            let changed = *field != new;
            *field = new;
            Ok((old, new_value, changed))
        }
        Op::Delete => {
            let changed = !field.is_empty();
            *field = AttrMap::new();
            Ok((old, None, changed))
        }
    }
}

fn attr_apply(attrs: &mut AttrMap, name: &str, op: Op) -> Result<Step, MutateError> {
    match op {
        Op::Set(value) => {
            let new = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(MutateError::BadValue {
                        key: name.to_string(),
                        detail: "attribute values must be string-like".to_string(),
                    })
                }
            };
            let old = attrs.get(name).map(|v| Value::String(v.to_string()));
            let changed = attrs.get(name) != Some(new.as_str());
            let new_value = Some(Value::String(new.clone()));
            attrs.set(name, new);
            Ok((old, new_value, changed))
        }
        Op::Delete => {
            let old = attrs.remove(name).map(Value::String);
            let changed = old.is_some();
            Ok((old, None, changed))
        }
    }
}

/// Indexed access into a plain item sequence (strings, methods, hooks);
/// only whole-item writes, one level deep.
fn item_seq_apply<T>(
    seq: &mut Vec<T>,
    rest: &[String],
    seq_key: &'static str,
    op: Op,
) -> Result<Step, MutateError>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    if rest.len() != 1 {
        return Err(MutateError::UnknownKey {
            key: rest.get(1).cloned().unwrap_or_default(),
            kind: seq_key,
        });
    }
    let len = seq.len();
    let idx = parse_index(&rest[0], len)?;
    match op {
        Op::Set(value) => {
            let new: T = from_value(value, seq_key)?;
            let new_value = serde_json::to_value(&new).ok();
            if idx < len {
                let changed = seq[idx] != new;
                let old = serde_json::to_value(&seq[idx]).ok();
                seq[idx] = new;
                Ok((old, new_value, changed))
            } else if idx == len {
                seq.push(new);
                Ok((None, new_value, true))
            } else {
                Err(MutateError::BadIndex {
                    segment: rest[0].clone(),
                    len,
                })
            }
        }
        Op::Delete => {
            if idx < len {
                let old = serde_json::to_value(&seq[idx]).ok();
                seq.remove(idx);
                Ok((old, None, true))
            } else {
                Err(MutateError::BadIndex {
                    segment: rest[0].clone(),
                    len,
                })
            }
        }
    }
}
