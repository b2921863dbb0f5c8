use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

/// Elements whose text never belongs to article content.
pub const NON_CONTENT_TAGS: [&str; 9] = [
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "menu",
];

const INLINE_TAGS: [&str; 16] = [
    "a", "abbr", "b", "cite", "code", "em", "i", "mark", "q", "small", "span", "strong", "sub",
    "sup", "time", "u",
];

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex compiles"));

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex compiles"));

/// Turn a markup-bearing snippet into plain text.
///
/// Entities are decoded by the HTML parser, every tag is dropped (the content
/// of `<script>` and `<style>` with it), markup that was itself
/// entity-encoded is stripped as well, control characters are removed and
/// whitespace runs collapse to a single space.
pub fn clean(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(text);
    let mut decoded = String::with_capacity(text.len());
    collect_text(fragment.root_element(), &["script", "style"], &mut decoded);

    let stripped = TAG_REGEX.replace_all(&decoded, " ");
    let printable: String = stripped
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{FFFD}'))
        .collect();

    collapse_whitespace(&printable)
}

/// Collapse all whitespace runs (including newlines) to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

/// Text of an element, skipping the subtrees of `skip` tags.
pub fn visible_text(element: ElementRef<'_>, skip: &[&str]) -> String {
    let mut out = String::new();
    collect_text(element, skip, &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if skip.contains(&el.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    // Block boundaries should not glue words together.
                    let block = !INLINE_TAGS.contains(&el.name());
                    if block {
                        out.push(' ');
                    }
                    collect_text(child_el, skip, out);
                    if block {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

/// Truncate to at most `max_chars` code points.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
