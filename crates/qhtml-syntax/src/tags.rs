//! Reserved-name tables for the DSL.
//!
//! The selector-mode heuristic and several builder rewrites depend on
//! knowing which tokens are real HTML tag names, which property names
//! alias text content, and which `on*` names are lifecycle hooks.

/// Recognized HTML tag names, sorted for binary search.
pub const KNOWN_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base",
    "bdi", "bdo", "blockquote", "body", "br", "button", "canvas", "caption",
    "cite", "code", "col", "colgroup", "data", "datalist", "dd", "del",
    "details", "dfn", "dialog", "div", "dl", "dt", "em", "embed", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "img",
    "input", "ins", "kbd", "label", "legend", "li", "link", "main", "map",
    "mark", "menu", "meta", "meter", "nav", "noscript", "object", "ol",
    "optgroup", "option", "output", "p", "picture", "pre", "progress", "q",
    "rp", "rt", "ruby", "s", "samp", "script", "section", "select", "slot",
    "small", "source", "span", "strong", "style", "sub", "summary", "sup",
    "table", "tbody", "td", "template", "textarea", "tfoot", "th", "thead",
    "time", "title", "tr", "track", "u", "ul", "var", "video", "wbr",
];

/// `on*` names reserved for lifecycle hooks rather than DOM events.
pub const LIFECYCLE_HOOKS: &[&str] = &[
    "onadopted",
    "onattributechanged",
    "onconnect",
    "ondisconnect",
    "onrendered",
];

/// Property names rewritten to append a text child instead of an attribute.
pub const TEXT_ALIASES: &[&str] = &["content", "innertext", "text"];

/// True if `name` is a recognized HTML tag (case-insensitive).
pub fn is_known_tag(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    KNOWN_TAGS.binary_search(&lower.as_str()).is_ok()
}

/// True if `name` belongs to the reserved lifecycle-hook set.
pub fn is_lifecycle_hook(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    LIFECYCLE_HOOKS.contains(&lower.as_str())
}

/// True if `name` is a text-content alias property.
pub fn is_text_alias(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TEXT_ALIASES.contains(&lower.as_str())
}

/// A selector token split into tag, class and id parts.
///
/// `div.card#main` yields tag `div`, classes `["card"]`, id `Some("main")`.
/// A leading modifier leaves the tag part empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorParts {
    pub tag: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
}

/// True if the token carries `.` or `#` modifiers.
pub fn has_modifiers(token: &str) -> bool {
    token.contains('.') || token.contains('#')
}

/// Split a selector token into its tag, class and id parts.
pub fn selector_parts(token: &str) -> SelectorParts {
    let mut tag = String::new();
    let mut classes = Vec::new();
    let mut id = None;

    enum Part {
        Tag,
        Class,
        Id,
    }
    let mut part = Part::Tag;
    let mut current = String::new();

    let mut flush = |part: &Part, current: &mut String| {
        let value = std::mem::take(current);
        match part {
            Part::Tag => tag = value,
            Part::Class => {
                if !value.is_empty() {
                    classes.push(value);
                }
            }
            Part::Id => {
                if !value.is_empty() {
                    id = Some(value);
                }
            }
        }
    };

    for c in token.chars() {
        match c {
            '.' => {
                flush(&part, &mut current);
                part = Part::Class;
            }
            '#' => {
                flush(&part, &mut current);
                part = Part::Id;
            }
            _ => current.push(c),
        }
    }
    flush(&part, &mut current);

    SelectorParts { tag, classes, id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags_sorted() {
        let mut sorted = KNOWN_TAGS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, KNOWN_TAGS);
    }

    #[test]
    fn test_is_known_tag() {
        assert!(is_known_tag("div"));
        assert!(is_known_tag("DIV"));
        assert!(is_known_tag("a"));
        assert!(!is_known_tag("card"));
        assert!(!is_known_tag("q-component"));
    }

    #[test]
    fn test_lifecycle_set() {
        assert!(is_lifecycle_hook("onconnect"));
        assert!(is_lifecycle_hook("onRendered"));
        assert!(!is_lifecycle_hook("onclick"));
    }

    #[test]
    fn test_selector_parts() {
        let parts = selector_parts("div.card#main");
        assert_eq!(parts.tag, "div");
        assert_eq!(parts.classes, vec!["card"]);
        assert_eq!(parts.id.as_deref(), Some("main"));

        let bare = selector_parts(".card.wide");
        assert_eq!(bare.tag, "");
        assert_eq!(bare.classes, vec!["card", "wide"]);
        assert_eq!(bare.id, None);
    }

    #[test]
    fn test_has_modifiers() {
        assert!(has_modifiers("div.card"));
        assert!(has_modifiers("#main"));
        assert!(!has_modifiers("my-widget"));
    }
}
