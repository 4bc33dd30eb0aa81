//! Source-to-document compile pipeline.
//!
//! Stage order is fixed: include resolution (when a loader is
//! supplied), macro expansion, script evaluation, parse, tree build,
//! normalization. Each intermediate text is recorded on the document's
//! metadata so callers can inspect what every stage saw.

use qhtml_dom::{Document, NodeMeta, ScriptRuleNode};
use qhtml_expand::{
    evaluate_scripts, expand_macros, AsyncIncludeLoader, AsyncIncludeResolver, ExpandError,
    ExpandOptions, IncludeCache, IncludeError, IncludeLoader, IncludeResolver, Resolution,
    ScriptHost, StaticEvaluator, DEFAULT_MAX_INCLUDES, DEFAULT_MAX_PASSES,
};
use qhtml_syntax::{parse, parse_event_rules, ParseError};
use tracing::debug;

use crate::build::build;
use crate::normalize::normalize;

/// Failure of any stage, wrapping that stage's own error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Include(#[from] IncludeError),
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Resolve `q-import` directives before the other stages. Only takes
    /// effect on the loader-taking entry points; without a loader the
    /// directives survive into document metadata as unresolved paths.
    pub resolve_includes: bool,
    /// Base the root document's references resolve against.
    pub base_url: Option<String>,
    pub max_includes: usize,
    /// Ceiling for macro-expansion and script-evaluation passes.
    pub max_passes: usize,
    /// Standalone event-rule sheet parsed into the document's rule
    /// sequence.
    pub script_rules: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            resolve_includes: true,
            base_url: None,
            max_includes: DEFAULT_MAX_INCLUDES,
            max_passes: DEFAULT_MAX_PASSES,
            script_rules: None,
        }
    }
}

/// Caches and the script host shared by one compilation flow. Separate
/// sessions never contaminate each other.
pub struct CompileSession {
    include_cache: IncludeCache,
    script_host: Box<dyn ScriptHost>,
}

impl Default for CompileSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileSession")
            .field("include_cache", &self.include_cache)
            .finish_non_exhaustive()
    }
}

impl CompileSession {
    pub fn new() -> Self {
        Self {
            include_cache: IncludeCache::new(),
            script_host: Box::new(StaticEvaluator),
        }
    }

    /// A session evaluating `q-script` bodies through the given host
    /// instead of the built-in static evaluator.
    pub fn with_script_host(host: impl ScriptHost + 'static) -> Self {
        Self {
            include_cache: IncludeCache::new(),
            script_host: Box::new(host),
        }
    }

    pub fn include_cache(&self) -> &IncludeCache {
        &self.include_cache
    }

    /// Compile without an include loader; `q-import` directives are left
    /// in place for the builder to record as unresolved paths.
    pub fn compile(
        &mut self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<Document, CompileError> {
        self.finish(source, None, options)
    }

    pub fn compile_with<L: IncludeLoader>(
        &mut self,
        source: &str,
        loader: &mut L,
        options: &CompileOptions,
    ) -> Result<Document, CompileError> {
        if !options.resolve_includes {
            return self.finish(source, None, options);
        }
        let resolution =
            sync_resolver(options).resolve(source, loader, &mut self.include_cache)?;
        self.finish(source, Some(resolution), options)
    }

    pub async fn compile_async<L: AsyncIncludeLoader>(
        &mut self,
        source: &str,
        loader: &mut L,
        options: &CompileOptions,
    ) -> Result<Document, CompileError> {
        if !options.resolve_includes {
            return self.finish(source, None, options);
        }
        let resolution = async_resolver(options)
            .resolve(source, loader, &mut self.include_cache)
            .await?;
        self.finish(source, Some(resolution), options)
    }

    fn finish(
        &mut self,
        raw: &str,
        resolution: Option<Resolution>,
        options: &CompileOptions,
    ) -> Result<Document, CompileError> {
        let (resolved_source, resolved_imports) = match resolution {
            Some(resolution) => (Some(resolution.source), resolution.imports),
            None => (None, Vec::new()),
        };
        let working = resolved_source.as_deref().unwrap_or(raw);

        let expand_options = ExpandOptions {
            max_passes: options.max_passes,
        };
        let expansion = expand_macros(working, self.script_host.as_mut(), &expand_options)?;
        let evaluated =
            evaluate_scripts(&expansion.source, self.script_host.as_mut(), options.max_passes)?;

        let ast = parse(&evaluated)?;
        let mut doc = build(&ast, &evaluated);
        normalize(&mut doc);

        // The document's own source is the raw input; the stage
        // snapshots sit alongside it.
        doc.meta.original_source = Some(raw.to_string());
        doc.meta.source_range = Some((0, raw.len()));
        doc.meta.resolved_source = resolved_source;
        doc.meta.q_rewrites = expansion.definition_names;
        doc.meta.rewritten_source = Some(expansion.source);
        doc.meta.evaluated_source = Some(evaluated);

        // Resolved URLs first, then whatever the builder saw unresolved.
        let mut imports = resolved_imports;
        for path in std::mem::take(&mut doc.meta.imports) {
            if !imports.contains(&path) {
                imports.push(path);
            }
        }
        doc.meta.imports = imports;

        if let Some(rules) = &options.script_rules {
            for rule in parse_event_rules(rules)? {
                doc.push_script_rule(ScriptRuleNode {
                    selector: rule.selector,
                    event: rule.event,
                    body: rule.body,
                    meta: NodeMeta::default(),
                });
            }
        }

        debug!(
            nodes = doc.nodes.len(),
            rules = doc.script_rules.len(),
            imports = doc.meta.imports.len(),
            "compiled document"
        );
        Ok(doc)
    }
}

fn sync_resolver<'a>(options: &CompileOptions) -> IncludeResolver<'a> {
    let mut resolver = IncludeResolver::new().max_includes(options.max_includes);
    if let Some(base) = &options.base_url {
        resolver = resolver.base_url(base.clone());
    }
    resolver
}

fn async_resolver<'a>(options: &CompileOptions) -> AsyncIncludeResolver<'a> {
    let mut resolver = AsyncIncludeResolver::new().max_includes(options.max_includes);
    if let Some(base) = &options.base_url {
        resolver = resolver.base_url(base.clone());
    }
    resolver
}

/// One-shot compile with a fresh session and no include loader.
pub fn parse_to_document(
    source: &str,
    options: &CompileOptions,
) -> Result<Document, CompileError> {
    CompileSession::new().compile(source, options)
}

/// One-shot compile resolving includes through a synchronous loader.
pub fn parse_to_document_with<L: IncludeLoader>(
    source: &str,
    loader: &mut L,
    options: &CompileOptions,
) -> Result<Document, CompileError> {
    CompileSession::new().compile_with(source, loader, options)
}

/// One-shot compile resolving includes through a non-blocking loader.
pub async fn parse_to_document_async<L: AsyncIncludeLoader>(
    source: &str,
    loader: &mut L,
    options: &CompileOptions,
) -> Result<Document, CompileError> {
    CompileSession::new().compile_async(source, loader, options).await
}
