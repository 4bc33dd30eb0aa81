//! Mutation observation over a document.
//!
//! A `TrackedDocument` owns a `Document` and routes every mutation
//! through the path-addressed operations, emitting one record per
//! effective change to an optional observer callback.

use serde::Serialize;
use serde_json::Value;

use crate::document::Document;
use crate::operations::{self, Applied, MutateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Set,
    Delete,
}

/// One effective mutation. No record is emitted for writes that leave
/// the value unchanged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Path of the node owning the mutated field; empty for the root.
    pub target: Vec<String>,
}

/// How a mutation affects consumers of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    /// Value-only: attributes, text values, a metadata record replaced
    /// wholesale. The tree shape is untouched and a renderer may patch
    /// in place.
    Leaf,
    /// Anything that adds, removes, replaces or re-types nodes.
    Structural,
}

/// Classify a mutation path. Unrecognized paths count as structural so
/// consumers never under-react to a shape change.
pub fn classify(path: &[String]) -> ChangeClass {
    let Some(last) = path.last() else {
        return ChangeClass::Leaf;
    };
    if last == "attributes" {
        return ChangeClass::Leaf;
    }
    if path.len() >= 2 && path[path.len() - 2] == "attributes" {
        return ChangeClass::Leaf;
    }
    // Only a trailing `meta` is a plain value write; paths into
    // metadata can reach the document's lifecycle collection.
    match last.as_str() {
        "textContent" | "value" | "meta" => ChangeClass::Leaf,
        _ => ChangeClass::Structural,
    }
}

/// A batch is structural as soon as any member is.
pub fn classify_batch<P: AsRef<[String]>>(paths: &[P]) -> ChangeClass {
    for path in paths {
        if classify(path.as_ref()) == ChangeClass::Structural {
            return ChangeClass::Structural;
        }
    }
    ChangeClass::Leaf
}

pub struct TrackedDocument {
    document: Document,
    sink: Option<Box<dyn FnMut(MutationRecord)>>,
    connected: bool,
}

impl std::fmt::Debug for TrackedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedDocument")
            .field("document", &self.document)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

/// Wrap a document and register a mutation sink in one step.
pub fn track<F>(document: Document, sink: F) -> TrackedDocument
where
    F: FnMut(MutationRecord) + 'static,
{
    let mut tracked = TrackedDocument::new(document);
    tracked.observe(sink);
    tracked
}

impl TrackedDocument {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            sink: None,
            connected: true,
        }
    }

    /// Install (or replace) the observer callback.
    pub fn observe<F>(&mut self, observer: F)
    where
        F: FnMut(MutationRecord) + 'static,
    {
        self.sink = Some(Box::new(observer));
        self.connected = true;
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_inner(self) -> Document {
        self.document
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drop the observer. The wrapper stays usable; further mutations
    /// simply go unreported.
    pub fn disconnect(&mut self) {
        self.sink = None;
        self.connected = false;
    }

    pub fn get(&self, path: &[&str]) -> Option<Value> {
        operations::get_path(&self.document, &owned(path))
    }

    pub fn set(&mut self, path: &[&str], value: Value) -> Result<Applied, MutateError> {
        let path = owned(path);
        let applied = operations::set_path(&mut self.document, &path, value)?;
        if applied.changed {
            operations::mark_dirty_at(&mut self.document, &applied.owner);
            self.emit(MutationRecord {
                kind: MutationKind::Set,
                path,
                old_value: applied.old_value.clone(),
                new_value: applied.new_value.clone(),
                target: applied.owner.clone(),
            });
        }
        Ok(applied)
    }

    pub fn delete(&mut self, path: &[&str]) -> Result<Applied, MutateError> {
        let path = owned(path);
        let applied = operations::delete_path(&mut self.document, &path)?;
        if applied.changed {
            operations::mark_dirty_at(&mut self.document, &applied.owner);
            self.emit(MutationRecord {
                kind: MutationKind::Delete,
                path,
                old_value: applied.old_value.clone(),
                new_value: None,
                target: applied.owner.clone(),
            });
        }
        Ok(applied)
    }

    fn emit(&mut self, record: MutationRecord) {
        if !self.connected {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            tracing::trace!(path = %record.path.join("."), kind = ?record.kind, "mutation");
            sink(record);
        }
    }
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        let mut el = match Node::element("div") {
            Node::Element(el) => el,
            _ => unreachable!(),
        };
        el.attributes.set("id", "x");
        el.children.push(Node::text("hi"));
        doc.push_node(Node::Element(el));
        doc
    }

    fn recording() -> (Rc<RefCell<Vec<MutationRecord>>>, TrackedDocument) {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        let tracked = track(sample_doc(), move |record| {
            sink.borrow_mut().push(record);
        });
        (records, tracked)
    }

    #[test]
    fn test_set_emits_record() {
        let (records, mut tracked) = recording();
        tracked
            .set(&["nodes", "0", "attributes", "id"], "y".into())
            .unwrap();
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.kind, MutationKind::Set);
        assert_eq!(record.old_value, Some("x".into()));
        assert_eq!(record.new_value, Some("y".into()));
        assert_eq!(record.target, vec!["nodes", "0"]);
    }

    #[test]
    fn test_unchanged_set_is_silent() {
        let (records, mut tracked) = recording();
        tracked
            .set(&["nodes", "0", "attributes", "id"], "x".into())
            .unwrap();
        assert!(records.borrow().is_empty());
        assert!(!tracked.document().is_dirty());
    }

    #[test]
    fn test_delete_emits_record() {
        let (records, mut tracked) = recording();
        tracked.delete(&["nodes", "0", "attributes", "id"]).unwrap();
        let records = records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, MutationKind::Delete);
        assert!(records[0].new_value.is_none());
    }

    #[test]
    fn test_dirty_marking() {
        let (_, mut tracked) = recording();
        tracked
            .set(&["nodes", "0", "children", "0", "value"], "bye".into())
            .unwrap();
        let doc = tracked.document();
        assert!(doc.meta.dirty);
        assert!(doc.nodes[0].children().unwrap()[0].meta().dirty);
    }

    #[test]
    fn test_disconnect_keeps_wrapper_usable() {
        let (records, mut tracked) = recording();
        tracked.disconnect();
        assert!(!tracked.is_connected());
        tracked
            .set(&["nodes", "0", "attributes", "id"], "z".into())
            .unwrap();
        assert!(records.borrow().is_empty());
        assert_eq!(
            tracked.get(&["nodes", "0", "attributes", "id"]),
            Some("z".into())
        );
    }

    #[test]
    fn test_record_serializes_with_type_field() {
        let record = MutationRecord {
            kind: MutationKind::Set,
            path: vec!["nodes".into(), "0".into()],
            old_value: None,
            new_value: Some("v".into()),
            target: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "set");
        assert!(json.get("oldValue").is_none());
        assert_eq!(json["newValue"], "v");
    }

    #[test]
    fn test_classify_paths() {
        let leaf = |segments: &[&str]| {
            let path: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            classify(&path)
        };
        assert_eq!(
            leaf(&["nodes", "0", "attributes", "id"]),
            ChangeClass::Leaf
        );
        assert_eq!(leaf(&["nodes", "0", "textContent"]), ChangeClass::Leaf);
        assert_eq!(
            leaf(&["nodes", "0", "children", "0", "value"]),
            ChangeClass::Leaf
        );
        assert_eq!(
            leaf(&["nodes", "0", "children", "1"]),
            ChangeClass::Structural
        );
        assert_eq!(leaf(&["nodes", "0", "tagName"]), ChangeClass::Structural);
        assert_eq!(
            leaf(&["nodes", "0", "children"]),
            ChangeClass::Structural
        );
    }

    #[test]
    fn test_classify_metadata_paths() {
        let class = |segments: &[&str]| {
            let path: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            classify(&path)
        };
        // Replacing a meta record wholesale is a value write.
        assert_eq!(class(&["meta"]), ChangeClass::Leaf);
        assert_eq!(class(&["nodes", "0", "meta"]), ChangeClass::Leaf);
        // Inside metadata sits the document's lifecycle collection;
        // anything below `meta` takes the structural default.
        assert_eq!(class(&["meta", "dirty"]), ChangeClass::Structural);
        assert_eq!(
            class(&["meta", "lifecycleScripts"]),
            ChangeClass::Structural
        );
        assert_eq!(
            class(&["meta", "lifecycleScripts", "0"]),
            ChangeClass::Structural
        );
        assert_eq!(
            class(&["meta", "lifecycleScripts", "0", "body"]),
            ChangeClass::Structural
        );
    }

    #[test]
    fn test_classify_batch_escalates() {
        let paths = vec![
            vec!["nodes".to_string(), "0".to_string(), "textContent".to_string()],
            vec!["nodes".to_string(), "1".to_string()],
        ];
        assert_eq!(classify_batch(&paths), ChangeClass::Structural);
        let empty: Vec<Vec<String>> = Vec::new();
        assert_eq!(classify_batch(&empty), ChangeClass::Leaf);
    }
}
