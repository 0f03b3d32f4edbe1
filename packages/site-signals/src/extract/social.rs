//! Social profile links by substring scan.
//!
//! This is a cheap scan over the markup, not a link-graph parse: for each
//! platform domain the first occurrence wins, the URL starts at the
//! nearest `http` before it and ends at the next quote, whitespace or tag
//! bracket. Minified markup without such delimiters can produce wrong
//! boundaries; the tests pin that behaviour down.

use crate::types::{SocialLinks, SocialPlatform};

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'"' | b'\'' | b'<' | b'>') || b.is_ascii_whitespace()
}

/// Scan `html` for the first link to each known platform.
pub fn extract_social_links(html: &str) -> SocialLinks {
    let mut links = SocialLinks::default();
    if html.is_empty() {
        return links;
    }

    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();

    for platform in SocialPlatform::ALL {
        if let Some(url) = platform
            .domains()
            .iter()
            .find_map(|domain| link_around(html, &lower, domain))
        {
            links.set(platform, url);
        }
    }

    links
}

/// The link containing the first occurrence of `domain`, if that
/// occurrence is preceded by an `http` token.
fn link_around(html: &str, lower: &str, domain: &str) -> Option<String> {
    let idx = lower.find(domain)?;
    let start = lower[..idx].rfind("http")?;
    let end = lower.as_bytes()[idx..]
        .iter()
        .position(|&b| is_delimiter(b))
        .map_or(lower.len(), |offset| idx + offset);

    // All three offsets sit on ASCII bytes, so they are char boundaries
    Some(html[start..end].to_string())
}
