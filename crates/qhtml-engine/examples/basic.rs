//! Example: compile a qhtml document and print what came out.

use qhtml_engine::{parse_to_document, serialize, to_dsl_text, CompileOptions};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let source = r#"div {
    id: "app"
    h1 { "qhtml" }
    p { "a tree, compiled from brace syntax" }
}
"#;

    let doc = parse_to_document(source, &CompileOptions::default()).expect("valid source");

    println!(
        "qhtml-engine v{}: {} top-level node(s)",
        qhtml_engine::VERSION,
        doc.nodes.len()
    );
    println!("{}", to_dsl_text(&doc));
    println!("persisted form: {} chars", serialize(&doc).len());
}
