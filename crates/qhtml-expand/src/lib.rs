//! qhtml source expansion passes
//!
//! Textual passes that run before parsing: named-macro rewriting
//! (`q-rewrite`), embedded-script evaluation (`q-script`) and inclusion
//! resolution (`q-import`). Every pass is string- and comment-aware and
//! leaves unrelated text byte-for-byte untouched.

pub mod include;
pub mod rewrite;
pub mod scan;
pub mod script;

pub use include::{
    AsyncIncludeLoader, AsyncIncludeResolver, BoxFuture, IncludeCache, IncludeContext,
    IncludeLoader, IncludeResolver, Resolution, DEFAULT_MAX_INCLUDES,
};
pub use rewrite::{expand_macros, ExpandOptions, Expansion, MacroDef, DEFAULT_MAX_PASSES};
pub use script::{
    evaluate_scripts, evaluate_scripts_with, DisabledScriptHost, ScriptContext, ScriptHost,
    StaticEvaluator,
};

/// Macro and script pass failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("unterminated {what} block at offset {index}")]
    Unterminated { what: &'static str, index: usize },

    #[error("expansion did not stabilize within {limit} passes")]
    PassLimitExceeded { limit: usize },

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Failures of a pluggable script host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script evaluation is disabled")]
    Disabled,

    #[error("unsupported script construct: {detail}")]
    Unsupported { detail: String },

    #[error("script failed: {0}")]
    Failed(String),
}

/// Inclusion resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IncludeError {
    #[error("unterminated import block at offset {index}")]
    Unterminated { index: usize },

    #[error("empty import path at offset {index}")]
    EmptyPath { index: usize },

    #[error("circular inclusion: {}", .chain.join(" -> "))]
    Circular { chain: Vec<String> },

    #[error("include limit of {limit} exceeded")]
    LimitExceeded { limit: usize },

    #[error("failed to load '{url}': {reason}")]
    LoadFailed { url: String, reason: String },

    #[error("cannot resolve '{path}' against base '{base}'")]
    BadBase { path: String, base: String },
}
