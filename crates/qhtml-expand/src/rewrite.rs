//! Named-macro rewriting (`q-rewrite`).
//!
//! Definitions are stripped from the source first; invocations are then
//! re-scanned and replaced until a whole pass makes no substitution,
//! bounded by a pass ceiling so self-expanding macros fail instead of
//! hanging.

use std::collections::BTreeMap;

use qhtml_syntax::cursor::Cursor;
use qhtml_syntax::unquote_body;

use crate::scan::{balanced_block, find_keyword, next_code_offset, top_level_named_blocks};
use crate::script::{evaluate_scripts_with, ScriptContext, ScriptHost};
use crate::ExpandError;

pub const DEFAULT_MAX_PASSES: usize = 200;

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Ceiling on re-scan passes before giving up.
    pub max_passes: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

/// A stripped `q-rewrite` definition.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// Declared via top-level `slot { name }` markers, or inferred from
    /// the template's own markers when none are top-level.
    pub slots: Vec<String>,
    pub template: String,
    /// Replaces the template-substitution model when present.
    pub return_body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub source: String,
    /// Names of the definitions stripped from the source.
    pub definition_names: Vec<String>,
}

pub fn expand_macros(
    text: &str,
    host: &mut dyn ScriptHost,
    options: &ExpandOptions,
) -> Result<Expansion, ExpandError> {
    let (stripped, defs) = strip_definitions(text)?;
    let definition_names: Vec<String> = defs.iter().map(|def| def.name.clone()).collect();
    if defs.is_empty() {
        return Ok(Expansion {
            source: stripped,
            definition_names,
        });
    }
    let mut source = stripped;
    for pass in 0..options.max_passes {
        let (next, changed) = expand_pass(&source, &defs, host, options.max_passes)?;
        if !changed {
            tracing::debug!(passes = pass, macros = defs.len(), "macro expansion stabilized");
            return Ok(Expansion {
                source: next,
                definition_names,
            });
        }
        source = next;
    }
    Err(ExpandError::PassLimitExceeded {
        limit: options.max_passes,
    })
}

fn strip_definitions(text: &str) -> Result<(String, Vec<MacroDef>), ExpandError> {
    let mut defs: Vec<MacroDef> = Vec::new();
    let mut out = String::new();
    let mut copied = 0;
    let mut pos = 0;
    while let Some(found) = find_keyword(text, "q-rewrite", pos) {
        let name_start = next_code_offset(text, found + "q-rewrite".len());
        let mut cursor = Cursor::at(text, name_start);
        let name = cursor.read_word();
        let brace = next_code_offset(text, cursor.pos());
        if name.is_empty() || !text[brace..].starts_with('{') {
            pos = found + "q-rewrite".len();
            continue;
        }
        let block = balanced_block(text, brace).ok_or(ExpandError::Unterminated {
            what: "macro definition",
            index: brace,
        })?;
        let def = parse_definition(&name, &text[block.inner_start..block.inner_end]);
        // A re-definition of the same name replaces the earlier one.
        match defs.iter_mut().find(|d| d.name == def.name) {
            Some(existing) => *existing = def,
            None => defs.push(def),
        }
        out.push_str(&text[copied..found]);
        copied = block.end;
        pos = block.end;
    }
    out.push_str(&text[copied..]);
    Ok((out, defs))
}

fn parse_definition(name: &str, body: &str) -> MacroDef {
    let mut slots = Vec::new();
    let mut return_body = None;
    let mut template = String::new();
    let mut copied = 0;
    for block in top_level_named_blocks(body) {
        match block.name.as_str() {
            "slot" => {
                let slot_name = unquote_body(&body[block.inner_start..block.inner_end]);
                let slot_name = slot_name.trim().to_string();
                if !slot_name.is_empty() && !slots.contains(&slot_name) {
                    slots.push(slot_name);
                }
                // The marker stays in the template as a placeholder.
            }
            "return" => {
                return_body = Some(body[block.inner_start..block.inner_end].to_string());
                template.push_str(&body[copied..block.start]);
                copied = block.end;
            }
            _ => {}
        }
    }
    template.push_str(&body[copied..]);
    let template = template.trim().to_string();
    if slots.is_empty() {
        slots = infer_slots(&template);
    }
    MacroDef {
        name: name.to_string(),
        slots,
        template,
        return_body,
    }
}

/// Slot names referenced anywhere in the template, for definitions that
/// never declare them at top level.
fn infer_slots(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut pos = 0;
    while let Some(found) = find_keyword(template, "slot", pos) {
        let brace = next_code_offset(template, found + "slot".len());
        if !template[brace..].starts_with('{') {
            pos = found + "slot".len();
            continue;
        }
        match balanced_block(template, brace) {
            Some(block) => {
                let name = unquote_body(&template[block.inner_start..block.inner_end]);
                let name = name.trim().to_string();
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
                pos = block.end;
            }
            None => pos = brace + 1,
        }
    }
    names
}

/// One left-to-right sweep; replacements are not re-scanned until the
/// next pass.
fn expand_pass(
    source: &str,
    defs: &[MacroDef],
    host: &mut dyn ScriptHost,
    max_passes: usize,
) -> Result<(String, bool), ExpandError> {
    let mut out = String::new();
    let mut copied = 0;
    let mut pos = 0;
    let mut changed = false;
    loop {
        let mut earliest: Option<(usize, &MacroDef)> = None;
        for def in defs {
            if let Some(found) = find_keyword(source, &def.name, pos) {
                if earliest.is_none_or(|(at, _)| found < at) {
                    earliest = Some((found, def));
                }
            }
        }
        let Some((found, def)) = earliest else { break };
        let brace = next_code_offset(source, found + def.name.len());
        if !source[brace..].starts_with('{') {
            pos = found + def.name.len();
            continue;
        }
        let block = balanced_block(source, brace).ok_or(ExpandError::Unterminated {
            what: "macro invocation",
            index: brace,
        })?;
        let replacement =
            expand_invocation(def, &source[block.inner_start..block.inner_end], host, max_passes)?;
        out.push_str(&source[copied..found]);
        out.push_str(&replacement);
        copied = block.end;
        pos = block.end;
        changed = true;
    }
    if !changed {
        return Ok((source.to_string(), false));
    }
    out.push_str(&source[copied..]);
    Ok((out, true))
}

fn expand_invocation(
    def: &MacroDef,
    body: &str,
    host: &mut dyn ScriptHost,
    max_passes: usize,
) -> Result<String, ExpandError> {
    let mut captures: BTreeMap<String, String> = BTreeMap::new();
    let mut leftover = String::new();
    let mut copied = 0;
    for block in top_level_named_blocks(body) {
        if !def.slots.iter().any(|slot| *slot == block.name) {
            continue;
        }
        let value = unquote_body(&body[block.inner_start..block.inner_end]);
        append_capture(&mut captures, &block.name, &value);
        leftover.push_str(&body[copied..block.start]);
        copied = block.end;
    }
    leftover.push_str(&body[copied..]);
    let leftover = leftover.trim();
    if !leftover.is_empty() {
        if def.slots.len() == 1 {
            append_capture(&mut captures, &def.slots[0], leftover);
        } else {
            append_capture(&mut captures, "default", leftover);
        }
    }
    match &def.return_body {
        Some(return_body) => {
            let substituted = substitute_slots(return_body, &captures);
            let ctx = ScriptContext { slots: captures };
            let evaluated = evaluate_scripts_with(&substituted, host, &ctx, max_passes)?;
            Ok(evaluated.trim().to_string())
        }
        None => Ok(substitute_slots(&def.template, &captures).trim().to_string()),
    }
}

/// Same-named captures merge in document order.
fn append_capture(captures: &mut BTreeMap<String, String>, name: &str, value: &str) {
    match captures.get_mut(name) {
        Some(existing) => {
            if !existing.is_empty() && !value.is_empty() {
                existing.push(' ');
            }
            existing.push_str(value);
        }
        None => {
            captures.insert(name.to_string(), value.to_string());
        }
    }
}

/// Replace every `slot { name }` marker; unmatched names fall back to
/// the `default` capture, else stay untouched.
fn substitute_slots(text: &str, captures: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut copied = 0;
    let mut pos = 0;
    while let Some(found) = find_keyword(text, "slot", pos) {
        let brace = next_code_offset(text, found + "slot".len());
        if !text[brace..].starts_with('{') {
            pos = found + "slot".len();
            continue;
        }
        let Some(block) = balanced_block(text, brace) else {
            pos = brace + 1;
            continue;
        };
        let name = unquote_body(&text[block.inner_start..block.inner_end]);
        match captures.get(name.trim()).or_else(|| captures.get("default")) {
            Some(value) => {
                out.push_str(&text[copied..found]);
                out.push_str(value);
                copied = block.end;
                pos = block.end;
            }
            None => pos = block.end,
        }
    }
    out.push_str(&text[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::StaticEvaluator;

    fn expand(text: &str) -> Result<Expansion, ExpandError> {
        expand_macros(text, &mut StaticEvaluator, &ExpandOptions::default())
    }

    #[test]
    fn test_template_substitution() {
        let out = expand("q-rewrite card { div { slot { title } } } card { title { \"Hi\" } }")
            .unwrap();
        assert_eq!(out.source.trim(), "div { Hi }");
        assert_eq!(out.definition_names, ["card"]);
    }

    #[test]
    fn test_return_body_with_script() {
        let src = "q-rewrite greet { slot { who } return { q-script { return \"hi \" + this.qdom().slot(\"who\") } } } greet { who { \"sam\" } }";
        let out = expand(src).unwrap();
        assert_eq!(out.source.trim(), "hi sam");
    }

    #[test]
    fn test_single_slot_takes_leftover() {
        let out = expand("q-rewrite wrap { slot { content } } wrap { div { } }").unwrap();
        assert_eq!(out.source.trim(), "div { }");
    }

    #[test]
    fn test_leftover_becomes_default() {
        let out = expand("q-rewrite two { slot { a } slot { b } } two { hello }").unwrap();
        assert_eq!(out.source.trim(), "hello hello");
    }

    #[test]
    fn test_unmatched_marker_stays() {
        let out = expand("q-rewrite solo { slot { x } } solo { }").unwrap();
        assert_eq!(out.source.trim(), "slot { x }");
    }

    #[test]
    fn test_nested_invocations_expand_over_passes() {
        let src = "q-rewrite inner { span { } } q-rewrite outer { div { inner { } } } outer { }";
        let out = expand(src).unwrap();
        assert_eq!(out.source.trim(), "div { span { } }");
        assert_eq!(out.definition_names, ["inner", "outer"]);
    }

    #[test]
    fn test_self_expansion_hits_pass_limit() {
        let err = expand("q-rewrite loop { loop { } } loop { }").unwrap_err();
        assert!(matches!(err, ExpandError::PassLimitExceeded { limit: 200 }));
    }

    #[test]
    fn test_invocation_inside_string_is_ignored() {
        let out = expand("q-rewrite card { div { } } p { text { \"card { }\" } }").unwrap();
        assert_eq!(out.source.trim(), "p { text { \"card { }\" } }");
    }

    #[test]
    fn test_unterminated_definition() {
        let err = expand("q-rewrite broken { div {").unwrap_err();
        assert!(matches!(err, ExpandError::Unterminated { .. }));
    }

    #[test]
    fn test_redefinition_replaces() {
        let out = expand("q-rewrite x { a { } } q-rewrite x { b { } } x { }").unwrap();
        assert_eq!(out.source.trim(), "b { }");
        assert_eq!(out.definition_names, ["x"]);
    }

    #[test]
    fn test_same_slot_supplied_twice_merges() {
        let out =
            expand("q-rewrite w { slot { c } } w { c { \"one\" } c { \"two\" } }").unwrap();
        assert_eq!(out.source.trim(), "one two");
    }

    #[test]
    fn test_no_definitions_is_identity() {
        let out = expand("div { id: \"x\" }").unwrap();
        assert_eq!(out.source, "div { id: \"x\" }");
        assert!(out.definition_names.is_empty());
    }
}
