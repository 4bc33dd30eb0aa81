//! Failure paths and boundary behavior for the compile pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use qhtml_engine::dom::{MutateError, PersistError};
use qhtml_engine::{
    deserialize, parse_to_document, parse_to_document_with, to_dsl_text, track, CompileError,
    CompileOptions, CompileSession, Node,
};
use qhtml_expand::{
    DisabledScriptHost, ExpandError, IncludeContext, IncludeError, ScriptContext, ScriptError,
    ScriptHost,
};
use serde_json::json;

// ===== parse failures =====

#[test]
fn test_unterminated_block_reports_offset() {
    let err = parse_to_document("div { id: \"x\"", &CompileOptions::default()).unwrap_err();
    let CompileError::Parse(parse) = err else {
        panic!("expected parse error");
    };
    assert!(parse.message.contains("unterminated block"));
    assert_eq!(parse.index, 4);
}

#[test]
fn test_unterminated_string_rejected() {
    let err = parse_to_document("div { id: \"x }", &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Parse(e) if e.message.contains("unterminated string")));
}

#[test]
fn test_unmatched_close_rejected() {
    let err = parse_to_document("div { } }", &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Parse(e) if e.message.contains("unmatched")));
}

// ===== rewrite and script ceilings =====

#[test]
fn test_self_expanding_macro_hits_pass_ceiling() {
    let src = "q-rewrite loop { return { loop { } } } loop { }";
    let options = CompileOptions {
        max_passes: 8,
        ..CompileOptions::default()
    };
    let err = parse_to_document(src, &options).unwrap_err();
    assert_eq!(
        err,
        CompileError::Expand(ExpandError::PassLimitExceeded { limit: 8 })
    );
}

#[test]
fn test_script_host_that_never_stabilizes() {
    struct Echo;

    impl ScriptHost for Echo {
        fn eval(&mut self, _body: &str, _ctx: &ScriptContext) -> Result<String, ScriptError> {
            Ok("q-script { again }".to_string())
        }
    }

    let mut session = CompileSession::with_script_host(Echo);
    let options = CompileOptions {
        max_passes: 5,
        ..CompileOptions::default()
    };
    let err = session
        .compile("div { q-script { start } }", &options)
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Expand(ExpandError::PassLimitExceeded { limit: 5 })
    );
}

#[test]
fn test_unsupported_script_construct() {
    let err = parse_to_document(
        r#"div { q-script { window.alert("x") } }"#,
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Expand(ExpandError::Script(ScriptError::Unsupported { .. }))
    ));
}

#[test]
fn test_disabled_script_host_rejects_scripts() {
    let mut session = CompileSession::with_script_host(DisabledScriptHost);
    let err = session
        .compile("q-script { 1 }", &CompileOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Expand(ExpandError::Script(ScriptError::Disabled))
    );
}

#[test]
fn test_unused_macro_stripped_but_recorded() {
    let src = r#"q-rewrite unused { return { span { } } } div { }"#;
    let doc = parse_to_document(src, &CompileOptions::default()).unwrap();
    assert_eq!(doc.meta.q_rewrites, vec!["unused"]);
    assert_eq!(doc.nodes.len(), 1);
    assert!(matches!(&doc.nodes[0], Node::Element(el) if el.tag_name == "div"));
}

// ===== inclusion failures =====

#[test]
fn test_circular_includes_rejected() {
    let mut loader = |url: &str, _ctx: &IncludeContext| -> Result<String, String> {
        match url {
            "a.qhtml" => Ok(r#"q-import { "b.qhtml" }"#.to_string()),
            "b.qhtml" => Ok(r#"q-import { "a.qhtml" }"#.to_string()),
            other => Err(format!("unknown {other}")),
        }
    };
    let err = parse_to_document_with(
        r#"q-import { "a.qhtml" }"#,
        &mut loader,
        &CompileOptions::default(),
    )
    .unwrap_err();
    let CompileError::Include(IncludeError::Circular { chain }) = err else {
        panic!("expected circular inclusion error");
    };
    assert_eq!(chain, ["a.qhtml", "b.qhtml", "a.qhtml"]);
}

#[test]
fn test_include_limit_enforced() {
    let mut loader = |url: &str, _ctx: &IncludeContext| -> Result<String, String> {
        match url {
            "a.qhtml" => Ok(r#"q-import { "b.qhtml" }"#.to_string()),
            "b.qhtml" => Ok(r#"q-import { "c.qhtml" }"#.to_string()),
            _ => Ok("footer { }".to_string()),
        }
    };
    let options = CompileOptions {
        max_includes: 2,
        ..CompileOptions::default()
    };
    let err = parse_to_document_with(r#"q-import { "a.qhtml" }"#, &mut loader, &options)
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Include(IncludeError::LimitExceeded { limit: 2 })
    );
}

#[test]
fn test_include_load_failure_names_url() {
    let mut loader =
        |_url: &str, _ctx: &IncludeContext| -> Result<String, String> {
            Err("connection refused".to_string())
        };
    let err = parse_to_document_with(
        r#"q-import { "gone.qhtml" }"#,
        &mut loader,
        &CompileOptions::default(),
    )
    .unwrap_err();
    let CompileError::Include(IncludeError::LoadFailed { url, reason }) = err else {
        panic!("expected load failure");
    };
    assert_eq!(url, "gone.qhtml");
    assert_eq!(reason, "connection refused");
}

#[test]
fn test_base_url_joins_relative_imports() {
    let mut seen = Vec::new();
    let mut loader = |url: &str, _ctx: &IncludeContext| -> Result<String, String> {
        seen.push(url.to_string());
        Ok("span { }".to_string())
    };
    let options = CompileOptions {
        base_url: Some("https://ex.com/parts/page.qhtml".to_string()),
        ..CompileOptions::default()
    };
    let doc =
        parse_to_document_with(r#"q-import { "a.qhtml" }"#, &mut loader, &options).unwrap();
    drop(loader);
    assert_eq!(seen, ["https://ex.com/parts/a.qhtml"]);
    assert_eq!(doc.meta.imports, vec!["https://ex.com/parts/a.qhtml"]);
}

#[test]
fn test_imports_recorded_without_loader() {
    let doc = parse_to_document(r#"q-import { "a.qhtml" } div { }"#, &CompileOptions::default())
        .unwrap();
    assert_eq!(doc.meta.imports, vec!["a.qhtml"]);
    // the directive itself leaves no node behind
    assert_eq!(doc.nodes.len(), 1);
}

// ===== degenerate documents =====

#[test]
fn test_empty_source() {
    let doc = parse_to_document("", &CompileOptions::default()).unwrap();
    assert!(doc.nodes.is_empty());
    assert_eq!(to_dsl_text(&doc), "");
}

#[test]
fn test_comments_only_source() {
    let src = "// nothing here\n";
    let doc = parse_to_document(src, &CompileOptions::default()).unwrap();
    assert!(doc.nodes.is_empty());
    assert_eq!(to_dsl_text(&doc), src);
}

#[test]
fn test_undefined_invocation_stays_element() {
    let doc = parse_to_document(r#"card { "x" }"#, &CompileOptions::default()).unwrap();
    assert!(matches!(&doc.nodes[0], Node::Element(el)
        if el.tag_name == "card" && el.text_content.as_deref() == Some("x")));
}

// ===== persistence and mutation guards =====

#[test]
fn test_foreign_persist_payloads_rejected() {
    assert!(matches!(deserialize("zip1:abc"), Err(PersistError::BadPrefix)));
    assert!(matches!(
        deserialize("qhtmlz1:@@@"),
        Err(PersistError::Corrupt(_))
    ));
}

#[test]
fn test_failed_mutations_emit_no_records() {
    let doc = parse_to_document("div { }", &CompileOptions::default()).unwrap();
    let hits = Rc::new(RefCell::new(0u32));
    let sink = {
        let hits = hits.clone();
        move |_record| *hits.borrow_mut() += 1
    };
    let mut tracked = track(doc, sink);
    assert!(matches!(
        tracked.set(&["nodes", "9", "tagName"], json!("p")),
        Err(MutateError::BadIndex { .. })
    ));
    assert!(matches!(
        tracked.set(&["nodes", "0", "kind"], json!("text")),
        Err(MutateError::ImmutableKind)
    ));
    assert_eq!(*hits.borrow(), 0);
}
