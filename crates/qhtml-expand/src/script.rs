//! Embedded-script evaluation (`q-script`).
//!
//! Each standalone `q-script { body }` occurrence is executed through a
//! pluggable host and its string result substituted in place. Passes
//! repeat until the text stabilizes, since an output may itself contain
//! another occurrence.

use std::collections::BTreeMap;

use qhtml_syntax::cursor::Cursor;

use crate::scan::{balanced_block, find_keyword, next_code_offset};
use crate::{ExpandError, ScriptError};

/// Values visible to an embedded script; macro expansion binds the
/// invocation's slot captures here.
#[derive(Debug, Clone, Default)]
pub struct ScriptContext {
    pub slots: BTreeMap<String, String>,
}

/// Pluggable evaluator for `q-script` bodies and macro `return` blocks.
/// Deployments may plug in a real interpreter, the built-in restricted
/// evaluator, or nothing at all.
pub trait ScriptHost {
    fn eval(&mut self, body: &str, ctx: &ScriptContext) -> Result<String, ScriptError>;
}

/// Rejects every script, for sources where embedded code must not run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledScriptHost;

impl ScriptHost for DisabledScriptHost {
    fn eval(&mut self, _body: &str, _ctx: &ScriptContext) -> Result<String, ScriptError> {
        Err(ScriptError::Disabled)
    }
}

/// Built-in evaluator covering the expression shapes qhtml sources
/// actually use: string and integer literals, `+` concatenation and
/// `this.qdom().slot("name")` lookups, with an optional leading
/// `return`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEvaluator;

impl ScriptHost for StaticEvaluator {
    fn eval(&mut self, body: &str, ctx: &ScriptContext) -> Result<String, ScriptError> {
        let mut src = body.trim();
        if let Some(rest) = src.strip_prefix("return") {
            if rest
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '('))
            {
                src = rest.trim_start();
            }
        }
        let src = src.trim_end_matches(';').trim_end();
        if src.is_empty() {
            return Ok(String::new());
        }
        let mut out = String::new();
        for term in split_concat(src) {
            out.push_str(&eval_term(term, ctx)?);
        }
        Ok(out)
    }
}

/// Split on `+` at paren depth zero, outside string literals.
fn split_concat(src: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in src.char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '+' if depth == 0 => {
                terms.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&src[start..]);
    terms
}

fn eval_term(term: &str, ctx: &ScriptContext) -> Result<String, ScriptError> {
    let term = term.trim();
    if term.starts_with('"') || term.starts_with('\'') {
        let mut cursor = Cursor::at(term, 0);
        if let Ok(value) = cursor.read_quoted() {
            if term[cursor.pos()..].trim().is_empty() {
                return Ok(value);
            }
        }
    } else if is_integer(term) {
        return Ok(term.to_string());
    } else if let Some(name) = parse_slot_access(term) {
        return Ok(ctx.slots.get(&name).cloned().unwrap_or_default());
    }
    Err(ScriptError::Unsupported {
        detail: term.chars().take(60).collect(),
    })
}

fn is_integer(term: &str) -> bool {
    let digits = term.strip_prefix('-').unwrap_or(term);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// `this.qdom().slot("name")`, tolerating interior whitespace.
fn parse_slot_access(term: &str) -> Option<String> {
    let rest = term.strip_prefix("this.qdom().slot")?.trim_start();
    let rest = rest.strip_prefix('(')?.trim_start();
    let mut cursor = Cursor::at(rest, 0);
    let name = cursor.read_quoted().ok()?;
    let rest = rest[cursor.pos()..].trim_start();
    rest.strip_prefix(')')?.trim().is_empty().then_some(name)
}

/// Run the script pass with an empty context.
pub fn evaluate_scripts(
    text: &str,
    host: &mut dyn ScriptHost,
    max_passes: usize,
) -> Result<String, ExpandError> {
    evaluate_scripts_with(text, host, &ScriptContext::default(), max_passes)
}

pub fn evaluate_scripts_with(
    text: &str,
    host: &mut dyn ScriptHost,
    ctx: &ScriptContext,
    max_passes: usize,
) -> Result<String, ExpandError> {
    let mut source = text.to_string();
    for pass in 0..max_passes {
        let (next, changed) = script_pass(&source, host, ctx)?;
        if !changed {
            if pass > 0 {
                tracing::debug!(passes = pass, "script evaluation stabilized");
            }
            return Ok(next);
        }
        source = next;
    }
    Err(ExpandError::PassLimitExceeded { limit: max_passes })
}

fn script_pass(
    source: &str,
    host: &mut dyn ScriptHost,
    ctx: &ScriptContext,
) -> Result<(String, bool), ExpandError> {
    let mut out = String::new();
    let mut copied = 0;
    let mut pos = 0;
    let mut changed = false;
    while let Some(found) = find_keyword(source, "q-script", pos) {
        let brace = next_code_offset(source, found + "q-script".len());
        if !source[brace..].starts_with('{') {
            pos = found + "q-script".len();
            continue;
        }
        let block = balanced_block(source, brace).ok_or(ExpandError::Unterminated {
            what: "script",
            index: brace,
        })?;
        let result = host.eval(&source[block.inner_start..block.inner_end], ctx)?;
        out.push_str(&source[copied..found]);
        // `.q-script{...}` chains as member access: drop the source dot
        // when the result supplies its own.
        if out.ends_with('.') && result.starts_with('.') {
            out.pop();
        }
        out.push_str(&result);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(name: &str, value: &str) -> ScriptContext {
        let mut ctx = ScriptContext::default();
        ctx.slots.insert(name.to_string(), value.to_string());
        ctx
    }

    #[test]
    fn test_literal_substitution() {
        let out = evaluate_scripts("a q-script { return \"b\" } c", &mut StaticEvaluator, 200).unwrap();
        assert_eq!(out, "a b c");
    }

    #[test]
    fn test_concatenation_and_slots() {
        let ctx = ctx_with("who", "sam");
        let out = StaticEvaluator
            .eval("return \"hi \" + this.qdom().slot(\"who\")", &ctx)
            .unwrap();
        assert_eq!(out, "hi sam");
    }

    #[test]
    fn test_missing_slot_is_empty() {
        let out = StaticEvaluator
            .eval("return this.qdom().slot(\"nope\")", &ScriptContext::default())
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_integers_and_semicolon() {
        let out = StaticEvaluator
            .eval("return 42;", &ScriptContext::default())
            .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_dot_elision() {
        let out = evaluate_scripts(
            "node.q-script { return \".cls\" } { }",
            &mut StaticEvaluator,
            200,
        )
        .unwrap();
        assert_eq!(out, "node.cls { }");
    }

    #[test]
    fn test_dot_kept_without_leading_dot_result() {
        let out =
            evaluate_scripts("node.q-script { return \"cls\" }", &mut StaticEvaluator, 200).unwrap();
        assert_eq!(out, "node.cls");
    }

    #[test]
    fn test_output_rescanned_next_pass() {
        struct Nesting;
        impl ScriptHost for Nesting {
            fn eval(&mut self, body: &str, _ctx: &ScriptContext) -> Result<String, ScriptError> {
                Ok(match body.trim() {
                    "outer" => "q-script { inner }".to_string(),
                    _ => "done".to_string(),
                })
            }
        }
        let out = evaluate_scripts("q-script { outer }", &mut Nesting, 200).unwrap();
        assert_eq!(out, "done");
    }

    #[test]
    fn test_never_stabilizing_hits_limit() {
        struct Echo;
        impl ScriptHost for Echo {
            fn eval(&mut self, _body: &str, _ctx: &ScriptContext) -> Result<String, ScriptError> {
                Ok("q-script { again }".to_string())
            }
        }
        let err = evaluate_scripts("q-script { start }", &mut Echo, 10).unwrap_err();
        assert!(matches!(err, ExpandError::PassLimitExceeded { limit: 10 }));
    }

    #[test]
    fn test_disabled_host() {
        let err = evaluate_scripts("q-script { return \"x\" }", &mut DisabledScriptHost, 200)
            .unwrap_err();
        assert!(matches!(err, ExpandError::Script(ScriptError::Disabled)));
    }

    #[test]
    fn test_unsupported_construct() {
        let err = StaticEvaluator
            .eval("return window.alert()", &ScriptContext::default())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Unsupported { .. }));
    }

    #[test]
    fn test_text_without_scripts_untouched() {
        let src = "div { text { \"q-script is a keyword\" } }";
        let out = evaluate_scripts(src, &mut StaticEvaluator, 200).unwrap();
        assert_eq!(out, src);
    }
}
