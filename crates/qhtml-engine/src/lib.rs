//! qhtml engine
//!
//! Front door for qhtml compilation: raw DSL text through include
//! resolution, macro expansion and script evaluation into a typed
//! document tree, plus re-emission back to source text. The stage
//! crates remain usable on their own; this crate only fixes their
//! order and threads the session state between them.

pub mod build;
pub mod normalize;
pub mod pipeline;

pub use build::build;
pub use normalize::normalize;
pub use pipeline::{
    parse_to_document, parse_to_document_async, parse_to_document_with, CompileError,
    CompileOptions, CompileSession,
};

// The model surface embedders reach for most, so depending on this
// crate alone is enough.
pub use qhtml_dom::{
    deserialize, serialize, to_dsl_text, to_dsl_text_with, track, Document, EmitOptions, Node,
    TrackedDocument,
};

pub use qhtml_dom as dom;
pub use qhtml_expand as expand;
pub use qhtml_syntax as syntax;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
