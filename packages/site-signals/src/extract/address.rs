//! Best-effort postal address extraction.
//!
//! Strategies run in order and the first one that produces something
//! wins; later strategies are never consulted. Every result is capped at
//! [`MAX_ADDRESS_CHARS`].

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use super::{cap_chars, non_empty, selector, text_lines};

/// Longest address we return.
pub const MAX_ADDRESS_CHARS: usize = 200;

/// Class/id fragments that suggest an element holds an address.
const ADDRESS_HINTS: &[&str] = &["address", "location", "contact", "office", "headquarters"];

/// PostalAddress members, in the order they are joined.
const POSTAL_FIELDS: &[&str] = &[
    "streetAddress",
    "addressLocality",
    "addressRegion",
    "postalCode",
    "addressCountry",
];

lazy_static! {
    static ref JSON_LD: Selector = selector(r#"script[type="application/ld+json"]"#);
    static ref ADDRESS_ELEMENT: Selector = selector("address");
    static ref FOOTER: Selector =
        selector(r#"footer, [role="contentinfo"], #footer, .footer, .site-footer"#);
    static ref HINTED: Selector = selector("[class], [id]");
    static ref STREET_LINE: Regex = Regex::new(
        r"(?i)\b\d{1,6}[a-z]?\s+(?:[\w.'\-]+\s+){0,5}(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|way|court|ct|place|pl|parkway|pkwy|highway|hwy|square|sq|terrace|suite|ste)\b"
    )
    .unwrap();
}

/// One way of finding an address in a document.
pub trait AddressStrategy: Send + Sync {
    /// Strategy name (for logging/debugging).
    fn name(&self) -> &'static str;

    fn extract(&self, document: &Html) -> Option<String>;
}

/// Embedded JSON-LD `address` / `PostalAddress` objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLdAddress;

/// Text of the first non-empty `<address>` element.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressElement;

/// Street-like lines inside footer regions.
#[derive(Debug, Default, Clone, Copy)]
pub struct FooterLines;

/// Street-like lines inside elements whose class or id hints at an address.
#[derive(Debug, Default, Clone, Copy)]
pub struct HintedElements;

/// The standard strategy order.
pub fn default_strategies() -> Vec<Box<dyn AddressStrategy>> {
    vec![
        Box::new(JsonLdAddress),
        Box::new(AddressElement),
        Box::new(FooterLines),
        Box::new(HintedElements),
    ]
}

/// Run the standard strategies over a parsed document.
pub fn extract_address(document: &Html) -> Option<String> {
    first_address(document, &default_strategies())
}

/// First non-empty result from `strategies`, capped.
pub fn first_address(document: &Html, strategies: &[Box<dyn AddressStrategy>]) -> Option<String> {
    strategies.iter().find_map(|strategy| {
        let found = strategy.extract(document)?;
        let capped = cap_chars(&found, MAX_ADDRESS_CHARS);
        if capped.is_empty() {
            return None;
        }
        tracing::trace!(strategy = strategy.name(), "address found");
        Some(capped)
    })
}

impl AddressStrategy for JsonLdAddress {
    fn name(&self) -> &'static str {
        "json_ld"
    }

    fn extract(&self, document: &Html) -> Option<String> {
        document.select(&JSON_LD).find_map(|script| {
            let raw: String = script.text().collect();
            let value: Value = serde_json::from_str(raw.trim()).ok()?;
            find_postal(&value)
        })
    }
}

fn find_postal(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(find_postal),
        Value::Object(map) => {
            let is_postal = map
                .get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case("PostalAddress"));
            if is_postal || map.contains_key("streetAddress") {
                if let Some(line) = compose_postal(map) {
                    return Some(line);
                }
            }
            if let Some(address) = map.get("address") {
                let found = match address {
                    Value::String(s) => non_empty(s),
                    other => find_postal(other),
                };
                if found.is_some() {
                    return found;
                }
            }
            map.iter()
                .filter(|(key, _)| key.as_str() != "address")
                .find_map(|(_, v)| match v {
                    Value::Array(_) | Value::Object(_) => find_postal(v),
                    _ => None,
                })
        }
        _ => None,
    }
}

fn compose_postal(map: &Map<String, Value>) -> Option<String> {
    let parts: Vec<String> = POSTAL_FIELDS
        .iter()
        .filter_map(|field| match map.get(*field)? {
            Value::String(s) => non_empty(s),
            Value::Number(n) => Some(n.to_string()),
            // addressCountry may be a Country object
            Value::Object(inner) => inner.get("name").and_then(Value::as_str).and_then(non_empty),
            _ => None,
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

impl AddressStrategy for AddressElement {
    fn name(&self) -> &'static str {
        "address_element"
    }

    fn extract(&self, document: &Html) -> Option<String> {
        document
            .select(&ADDRESS_ELEMENT)
            .find_map(|el| non_empty(&text_lines(el).join(", ")))
    }
}

impl AddressStrategy for FooterLines {
    fn name(&self) -> &'static str {
        "footer_lines"
    }

    fn extract(&self, document: &Html) -> Option<String> {
        document.select(&FOOTER).find_map(address_line_in)
    }
}

impl AddressStrategy for HintedElements {
    fn name(&self) -> &'static str {
        "hinted_elements"
    }

    fn extract(&self, document: &Html) -> Option<String> {
        document
            .select(&HINTED)
            .filter(|el| has_address_hint(*el))
            .find_map(address_line_in)
    }
}

fn has_address_hint(el: ElementRef<'_>) -> bool {
    let value = el.value();
    let attrs = [value.attr("class"), value.attr("id")];
    attrs.iter().flatten().any(|attr| {
        let attr = attr.to_ascii_lowercase();
        ADDRESS_HINTS.iter().any(|hint| attr.contains(hint))
    })
}

/// A street line with a comma, or a street line joined with a following
/// comma-separated line (city, region, postcode).
fn address_line_in(el: ElementRef<'_>) -> Option<String> {
    let lines = text_lines(el);

    lines.iter().enumerate().find_map(|(i, line)| {
        let street = STREET_LINE.find(line)?;
        let from_street = &line[street.start()..];
        if from_street.contains(',') {
            return Some(from_street.to_string());
        }
        lines
            .get(i + 1)
            .filter(|next| next.contains(','))
            .map(|next| format!("{}, {}", from_street, next))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(html: &str) -> Option<String> {
        extract_address(&Html::parse_document(html))
    }

    #[test]
    fn test_json_ld_postal_address() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context": "https://schema.org", "@type": "Organization", "name": "Acme",
             "address": {"@type": "PostalAddress", "streetAddress": "1 Main St", "addressLocality": "Springfield"}}
            </script></head><body></body></html>"#;
        assert_eq!(address(html).as_deref(), Some("1 Main St, Springfield"));
    }

    #[test]
    fn test_json_ld_graph_and_full_fields() {
        let html = r#"<script type="application/ld+json">
            {"@graph": [
                {"@type": "WebSite", "name": "Acme"},
                {"@type": "LocalBusiness", "address": {
                    "streetAddress": "742 Evergreen Terrace", "addressLocality": "Springfield",
                    "addressRegion": "OR", "postalCode": "97403",
                    "addressCountry": {"@type": "Country", "name": "US"}}}
            ]}
            </script>"#;
        assert_eq!(
            address(html).as_deref(),
            Some("742 Evergreen Terrace, Springfield, OR, 97403, US")
        );
    }

    #[test]
    fn test_json_ld_string_address() {
        let html = r#"<script type="application/ld+json">[{"@type": "Organization", "address": "9 Elm Rd, Shelbyville"}]</script>"#;
        assert_eq!(address(html).as_deref(), Some("9 Elm Rd, Shelbyville"));
    }

    #[test]
    fn test_json_ld_wins_over_address_element() {
        let html = r#"<script type="application/ld+json">{"address": {"streetAddress": "1 Main St"}}</script>
            <address>Somewhere else</address>"#;
        assert_eq!(address(html).as_deref(), Some("1 Main St"));
    }

    #[test]
    fn test_broken_json_ld_falls_through() {
        let html = r#"<script type="application/ld+json">{not json</script>
            <address>Acme Inc.<br>1 Main St<br>Springfield, IL 62701</address>"#;
        assert_eq!(
            address(html).as_deref(),
            Some("Acme Inc., 1 Main St, Springfield, IL 62701")
        );
    }

    #[test]
    fn test_footer_line() {
        let html = r#"<body><p>We ship from 12 warehouses worldwide.</p>
            <footer><p>© Acme</p><p>Visit us at 100 Industrial Way, Springfield, IL 62701</p></footer></body>"#;
        assert_eq!(
            address(html).as_deref(),
            Some("100 Industrial Way, Springfield, IL 62701")
        );
    }

    #[test]
    fn test_footer_street_joined_with_city_line() {
        let html = r#"<footer><div>221 Baker Street</div><div>London, NW1 6XE</div></footer>"#;
        assert_eq!(
            address(html).as_deref(),
            Some("221 Baker Street, London, NW1 6XE")
        );
    }

    #[test]
    fn test_hinted_element() {
        let html = r#"<body><div class="Contact-Info"><span>Phone: 555</span>
            <p>Suite 5, 1600 Amphitheatre Pkwy, Mountain View, CA</p></div></body>"#;
        assert_eq!(
            address(html).as_deref(),
            Some("1600 Amphitheatre Pkwy, Mountain View, CA")
        );
    }

    #[test]
    fn test_result_is_capped() {
        let long = "x".repeat(400);
        let html = format!("<address>{}</address>", long);
        assert_eq!(address(&html).unwrap().chars().count(), MAX_ADDRESS_CHARS);
    }

    #[test]
    fn test_no_address() {
        assert!(address("<html><body><p>Hello world</p></body></html>").is_none());
        assert!(address("").is_none());
    }

    #[test]
    fn test_custom_strategy_order() {
        let html = Html::parse_document(
            r#"<address>Element address</address><footer>1 Main St, Springfield</footer>"#,
        );
        let strategies: Vec<Box<dyn AddressStrategy>> =
            vec![Box::new(FooterLines), Box::new(AddressElement)];
        assert_eq!(
            first_address(&html, &strategies).as_deref(),
            Some("1 Main St, Springfield")
        );
    }
}
