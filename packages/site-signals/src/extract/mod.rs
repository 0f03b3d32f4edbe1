//! Deterministic extraction from raw or rendered HTML.
//!
//! Everything here is a pure function of its input: no I/O, no errors.
//! Malformed markup degrades to `None` fields and empty collections.

pub mod address;
pub mod contact;
pub mod content;
pub mod phone;
pub mod social;

pub use address::{default_strategies, extract_address, AddressStrategy};
pub use contact::{extract_contacts, extract_emails};
pub use content::parse_content;
pub use phone::extract_phones;
pub use social::extract_social_links;

use scraper::{ElementRef, Selector};

/// Elements whose text is never visible page content.
pub(crate) const NON_VISIBLE: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol",
    "p", "section", "table", "td", "th", "tr", "ul",
];

/// Parse a selector that is known to be valid.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// Collapse runs of whitespace and trim.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized text, or `None` when nothing is left.
pub(crate) fn non_empty(text: &str) -> Option<String> {
    let text = normalize_whitespace(text);
    (!text.is_empty()).then_some(text)
}

/// Text under `el`, skipping the subtrees of any element named in `skip`.
pub(crate) fn text_skipping(el: ElementRef<'_>, skip: &[&str]) -> String {
    let mut out = String::new();
    push_text(el, skip, false, &mut out);
    out
}

/// Text under `el` split into lines at block boundaries and `<br>`.
pub(crate) fn text_lines(el: ElementRef<'_>) -> Vec<String> {
    let mut out = String::new();
    push_text(el, NON_VISIBLE, true, &mut out);
    out.lines().filter_map(non_empty).collect()
}

fn push_text(el: ElementRef<'_>, skip: &[&str], line_breaks: bool, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if skip.contains(&name) {
                continue;
            }
            let block = line_breaks && BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push('\n');
            }
            push_text(child_el, skip, line_breaks, out);
            if block {
                out.push('\n');
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters, dropping trailing separators.
pub(crate) fn cap_chars(text: &str, max_chars: usize) -> String {
    let capped: String = text.chars().take(max_chars).collect();
    capped
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}
