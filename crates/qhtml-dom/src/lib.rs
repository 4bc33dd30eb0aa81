//! qhtml model tree
//!
//! Typed document tree for parsed qhtml sources: path-addressed
//! mutation, change observation, faithful text re-emission and compact
//! persistence.

pub mod document;
pub mod emit;
pub mod encode;
pub mod node;
pub mod observer;
pub mod operations;
pub mod persist;

pub use document::{Document, DocumentMeta, LifecycleScript};
pub use emit::{to_dsl_text, to_dsl_text_with, EmitOptions};
pub use node::{
    AttrMap, ChainMode, DefinitionNode, DefinitionType, ElementNode, HookDef, InstanceNode,
    MethodDef, Node, NodeMeta, RawHtmlNode, ScriptRuleNode, SlotNode, TextNode,
};
pub use observer::{
    classify, classify_batch, track, ChangeClass, MutationKind, MutationRecord, TrackedDocument,
};
pub use operations::{
    delete_path, get_path, node_at, node_at_mut, set_path, Applied, MutateError,
};
pub use persist::{deserialize, serialize, PersistError, FORMAT_PREFIX};
