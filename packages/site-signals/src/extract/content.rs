//! Title, meta description and main-text extraction.

use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{non_empty, selector, text_skipping, NON_VISIBLE};
use crate::types::ExtractedContent;

/// Elements treated as page chrome rather than content.
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "template", "head", "nav", "header", "footer", "aside",
    "form", "iframe", "svg",
];

lazy_static! {
    static ref OG_TITLE: Selector = selector(r#"meta[property="og:title"], meta[name="og:title"]"#);
    static ref TITLE: Selector = selector("title");
    static ref H1: Selector = selector("h1");
    static ref META: Selector = selector("meta");
    static ref BODY: Selector = selector("body");
    // Readability resolves relative links against this; they never reach the output
    static ref BASE_URL: Url = Url::parse("http://localhost/").unwrap();
}

/// Extract title, meta description and main text from an HTML document.
pub fn parse_content(html: &str) -> ExtractedContent {
    if html.trim().is_empty() {
        return ExtractedContent::default();
    }

    let document = Html::parse_document(html);

    ExtractedContent {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        main_text: extract_main_text(html, &document),
    }
}

/// `og:title`, then `<title>`, then the first `<h1>`.
fn extract_title(document: &Html) -> Option<String> {
    document
        .select(&OG_TITLE)
        .filter_map(|el| el.value().attr("content"))
        .find_map(non_empty)
        .or_else(|| first_text(document, &TITLE))
        .or_else(|| first_text(document, &H1))
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| non_empty(&el.text().collect::<String>()))
}

/// First `description` or `og:description` meta in document order.
fn extract_meta_description(document: &Html) -> Option<String> {
    document.select(&META).find_map(|el| {
        let meta = el.value();
        let key = meta.attr("name").or_else(|| meta.attr("property"))?;
        if key.eq_ignore_ascii_case("description") || key.eq_ignore_ascii_case("og:description") {
            meta.attr("content").and_then(non_empty)
        } else {
            None
        }
    })
}

fn extract_main_text(html: &str, document: &Html) -> Option<String> {
    readable_text(html).or_else(|| {
        document
            .select(&BODY)
            .next()
            .and_then(|body| non_empty(&text_skipping(body, BOILERPLATE)))
    })
}

/// Readability pass over the raw document, with boilerplate stripped from
/// the isolated fragment.
fn readable_text(html: &str) -> Option<String> {
    let extracted = catch_unwind(AssertUnwindSafe(|| {
        let mut input = Cursor::new(html.as_bytes());
        readability::extractor::extract(&mut input, &BASE_URL)
    }));

    let product = match extracted {
        Ok(Ok(product)) => product,
        Ok(Err(e)) => {
            debug!(error = ?e, "readability extraction failed");
            return None;
        }
        Err(_) => {
            debug!("readability extraction panicked");
            return None;
        }
    };

    let fragment = Html::parse_fragment(&product.content);
    let root: ElementRef<'_> = fragment.root_element();
    non_empty(&text_skipping(root, BOILERPLATE))
}

/// Text a reader would see, ignoring scripts and styles but keeping chrome.
pub(crate) fn visible_text(document: &Html) -> String {
    text_skipping(document.root_element(), NON_VISIBLE)
}
