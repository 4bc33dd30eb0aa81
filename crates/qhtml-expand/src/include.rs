//! Inclusion resolution (`q-import`).
//!
//! Each `q-import { "path" }` directive is replaced by the referenced
//! source, itself resolved recursively against the included file as the
//! new base. Repeated references load once through a content cache, and
//! the active inclusion chain is tracked so cycles fail instead of
//! recursing forever.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qhtml_syntax::unquote_body;
use url::Url;

use crate::scan::{balanced_block, find_keyword, next_code_offset};
use crate::IncludeError;

/// Inclusion depth times breadth ceiling: total loads in one resolution.
pub const DEFAULT_MAX_INCLUDES: usize = 64;

/// Passed to loaders alongside the resolved URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeContext {
    /// The path exactly as written in the directive.
    pub path: String,
    /// The document the directive appeared in, when known.
    pub base_url: Option<String>,
}

/// Fetches source text for a resolved reference. Errors are plain
/// strings; the resolver wraps them with the failing URL.
pub trait IncludeLoader {
    fn load(&mut self, url: &str, ctx: &IncludeContext) -> Result<String, String>;
}

impl<F> IncludeLoader for F
where
    F: FnMut(&str, &IncludeContext) -> Result<String, String>,
{
    fn load(&mut self, url: &str, ctx: &IncludeContext) -> Result<String, String> {
        self(url, ctx)
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// [`IncludeLoader`] for sources that arrive over the network.
pub trait AsyncIncludeLoader {
    fn load<'a>(
        &'a mut self,
        url: &'a str,
        ctx: &'a IncludeContext,
    ) -> BoxFuture<'a, Result<String, String>>;
}

impl<F> AsyncIncludeLoader for F
where
    F: for<'a> FnMut(&'a str, &'a IncludeContext) -> BoxFuture<'a, Result<String, String>>,
{
    fn load<'a>(
        &'a mut self,
        url: &'a str,
        ctx: &'a IncludeContext,
    ) -> BoxFuture<'a, Result<String, String>> {
        self(url, ctx)
    }
}

/// Fully-resolved source keyed by resolved URL. Shared across documents
/// so a partial repeatedly included is fetched and expanded once.
#[derive(Debug, Clone, Default)]
pub struct IncludeCache {
    entries: HashMap<String, String>,
}

impl IncludeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn insert(&mut self, url: String, source: String) {
        self.entries.insert(url, source);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }
}

/// Outcome of a resolution: the spliced source plus every distinct
/// reference encountered, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub source: String,
    pub imports: Vec<String>,
}

#[derive(Default)]
struct ResolveState {
    loads: usize,
    imports: Vec<String>,
    visiting: Vec<String>,
}

struct Directive {
    start: usize,
    end: usize,
    path: String,
}

fn scan_directives(text: &str) -> Result<Vec<Directive>, IncludeError> {
    let mut directives = Vec::new();
    let mut pos = 0;
    while let Some(found) = find_keyword(text, "q-import", pos) {
        let brace = next_code_offset(text, found + "q-import".len());
        if !text[brace..].starts_with('{') {
            pos = found + "q-import".len();
            continue;
        }
        let block = balanced_block(text, brace).ok_or(IncludeError::Unterminated { index: brace })?;
        let path = unquote_body(&text[block.inner_start..block.inner_end]);
        if path.is_empty() {
            return Err(IncludeError::EmptyPath {
                index: block.inner_start,
            });
        }
        directives.push(Directive {
            start: found,
            end: block.end,
            path,
        });
        pos = block.end;
    }
    Ok(directives)
}

/// Absolute URLs pass through as written; everything else resolves
/// against the base (URL join, or lexical path join with `.`/`..`
/// normalization).
fn resolve_reference(path: &str, base: Option<&str>) -> Result<String, IncludeError> {
    if Url::parse(path).is_ok() {
        return Ok(path.to_string());
    }
    match base {
        Some(base) => {
            if let Ok(base_url) = Url::parse(base) {
                return base_url
                    .join(path)
                    .map(|joined| joined.to_string())
                    .map_err(|_| IncludeError::BadBase {
                        path: path.to_string(),
                        base: base.to_string(),
                    });
            }
            let dir = match base.rfind('/') {
                Some(i) => &base[..=i],
                None => "",
            };
            Ok(normalize_segments(&format!("{dir}{path}")))
        }
        None => Ok(normalize_segments(path)),
    }
}

fn normalize_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|s| *s != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Resolves `q-import` directives through a synchronous loader.
pub struct IncludeResolver<'a> {
    base_url: Option<String>,
    max_includes: usize,
    on_include: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl Default for IncludeResolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IncludeResolver<'a> {
    pub fn new() -> Self {
        Self {
            base_url: None,
            max_includes: DEFAULT_MAX_INCLUDES,
            on_include: None,
        }
    }

    /// Base the root document's references resolve against.
    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn max_includes(mut self, limit: usize) -> Self {
        self.max_includes = limit;
        self
    }

    /// Called once per actual load, after the loader succeeds; cache
    /// hits do not fire it.
    pub fn on_include(mut self, observer: impl FnMut(&str) + 'a) -> Self {
        self.on_include = Some(Box::new(observer));
        self
    }

    pub fn resolve<L: IncludeLoader>(
        mut self,
        text: &str,
        loader: &mut L,
        cache: &mut IncludeCache,
    ) -> Result<Resolution, IncludeError> {
        let mut state = ResolveState::default();
        let base = self.base_url.take();
        let source = self.resolve_level(text, base.as_deref(), loader, cache, &mut state)?;
        tracing::debug!(
            loads = state.loads,
            imports = state.imports.len(),
            "inclusion resolved"
        );
        Ok(Resolution {
            source,
            imports: state.imports,
        })
    }

    fn resolve_level<L: IncludeLoader>(
        &mut self,
        text: &str,
        base: Option<&str>,
        loader: &mut L,
        cache: &mut IncludeCache,
        state: &mut ResolveState,
    ) -> Result<String, IncludeError> {
        let directives = scan_directives(text)?;
        if directives.is_empty() {
            return Ok(text.to_string());
        }
        let mut out = String::new();
        let mut copied = 0;
        for directive in directives {
            let resolved = resolve_reference(&directive.path, base)?;
            if !state.imports.contains(&resolved) {
                state.imports.push(resolved.clone());
            }
            if state.visiting.contains(&resolved) {
                let mut chain = state.visiting.clone();
                chain.push(resolved);
                return Err(IncludeError::Circular { chain });
            }
            let content = match cache.get(&resolved) {
                Some(cached) => cached.to_string(),
                None => {
                    if state.loads + 1 > self.max_includes {
                        return Err(IncludeError::LimitExceeded {
                            limit: self.max_includes,
                        });
                    }
                    state.loads += 1;
                    let ctx = IncludeContext {
                        path: directive.path.clone(),
                        base_url: base.map(str::to_string),
                    };
                    let raw =
                        loader
                            .load(&resolved, &ctx)
                            .map_err(|reason| IncludeError::LoadFailed {
                                url: resolved.clone(),
                                reason,
                            })?;
                    if let Some(observer) = self.on_include.as_mut() {
                        observer(&resolved);
                    }
                    state.visiting.push(resolved.clone());
                    let expanded =
                        self.resolve_level(&raw, Some(&resolved), loader, cache, state)?;
                    state.visiting.pop();
                    cache.insert(resolved, expanded.clone());
                    expanded
                }
            };
            out.push_str(&text[copied..directive.start]);
            out.push_str(&content);
            copied = directive.end;
        }
        out.push_str(&text[copied..]);
        Ok(out)
    }
}

/// [`IncludeResolver`] over an [`AsyncIncludeLoader`].
pub struct AsyncIncludeResolver<'a> {
    base_url: Option<String>,
    max_includes: usize,
    on_include: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl Default for AsyncIncludeResolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> AsyncIncludeResolver<'a> {
    pub fn new() -> Self {
        Self {
            base_url: None,
            max_includes: DEFAULT_MAX_INCLUDES,
            on_include: None,
        }
    }

    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn max_includes(mut self, limit: usize) -> Self {
        self.max_includes = limit;
        self
    }

    pub fn on_include(mut self, observer: impl FnMut(&str) + 'a) -> Self {
        self.on_include = Some(Box::new(observer));
        self
    }

    pub async fn resolve<L: AsyncIncludeLoader>(
        mut self,
        text: &str,
        loader: &mut L,
        cache: &mut IncludeCache,
    ) -> Result<Resolution, IncludeError> {
        let mut state = ResolveState::default();
        let base = self.base_url.take();
        let source = self
            .resolve_level(text.to_string(), base, loader, cache, &mut state)
            .await?;
        tracing::debug!(
            loads = state.loads,
            imports = state.imports.len(),
            "inclusion resolved"
        );
        Ok(Resolution {
            source,
            imports: state.imports,
        })
    }

    // Recursion through an async fn needs the boxed indirection.
    fn resolve_level<'s, L: AsyncIncludeLoader>(
        &'s mut self,
        text: String,
        base: Option<String>,
        loader: &'s mut L,
        cache: &'s mut IncludeCache,
        state: &'s mut ResolveState,
    ) -> BoxFuture<'s, Result<String, IncludeError>> {
        Box::pin(async move {
            let directives = scan_directives(&text)?;
            if directives.is_empty() {
                return Ok(text);
            }
            let mut out = String::new();
            let mut copied = 0;
            for directive in directives {
                let resolved = resolve_reference(&directive.path, base.as_deref())?;
                if !state.imports.contains(&resolved) {
                    state.imports.push(resolved.clone());
                }
                if state.visiting.contains(&resolved) {
                    let mut chain = state.visiting.clone();
                    chain.push(resolved);
                    return Err(IncludeError::Circular { chain });
                }
                let content = match cache.get(&resolved) {
                    Some(cached) => cached.to_string(),
                    None => {
                        if state.loads + 1 > self.max_includes {
                            return Err(IncludeError::LimitExceeded {
                                limit: self.max_includes,
                            });
                        }
                        state.loads += 1;
                        let ctx = IncludeContext {
                            path: directive.path.clone(),
                            base_url: base.clone(),
                        };
                        let raw = loader.load(&resolved, &ctx).await.map_err(|reason| {
                            IncludeError::LoadFailed {
                                url: resolved.clone(),
                                reason,
                            }
                        })?;
                        if let Some(observer) = self.on_include.as_mut() {
                            observer(&resolved);
                        }
                        state.visiting.push(resolved.clone());
                        let expanded = self
                            .resolve_level(raw, Some(resolved.clone()), loader, cache, state)
                            .await?;
                        state.visiting.pop();
                        cache.insert(resolved, expanded.clone());
                        expanded
                    }
                };
                out.push_str(&text[copied..directive.start]);
                out.push_str(&content);
                copied = directive.end;
            }
            out.push_str(&text[copied..]);
            Ok(out)
        })
    }
}
