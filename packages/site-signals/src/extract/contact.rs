//! Contact extraction: emails, phones, social links and address.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use super::address::extract_address;
use super::content::visible_text;
use super::phone::extract_phones;
use super::social::extract_social_links;
use super::selector;
use crate::types::ContactRecord;

/// Substrings that mark an address as a placeholder or unmonitored.
const PLACEHOLDER_PATTERNS: &[&str] = &["example.com", "no-reply", "test@"];

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"[a-zA-Z0-9_.+\-]+@[a-zA-Z0-9\-]+\.[a-zA-Z0-9\-.]+").unwrap();
    // Retina asset names such as logo@2x.png look like addresses
    static ref ASSET_SUFFIX: Regex =
        Regex::new(r"\.(?:png|jpe?g|gif|svg|webp|avif|ico|bmp|css|js)$").unwrap();
    static ref TEL_LINK: Selector = selector(r#"a[href^="tel:"], a[href^="TEL:"]"#);
}

/// Email-like tokens in `text`, lowercased, filtered and sorted.
pub fn extract_emails(text: &str) -> BTreeSet<String> {
    EMAIL
        .find_iter(text)
        .filter_map(|m| {
            let email = m
                .as_str()
                .trim_end_matches(['.', '-'])
                .to_ascii_lowercase();
            let domain = email.rsplit_once('@')?.1;
            if !domain.contains('.') || domain.starts_with('.') {
                return None;
            }
            if PLACEHOLDER_PATTERNS.iter().any(|p| email.contains(p)) {
                return None;
            }
            if ASSET_SUFFIX.is_match(&email) {
                return None;
            }
            Some(email)
        })
        .collect()
}

/// Extract every contact signal from an HTML document.
///
/// Emails come from the raw markup (so `mailto:` links count), phones
/// from the visible text and `tel:` links, social links from a substring
/// scan, and the address from the tiered strategies.
pub fn extract_contacts(html: &str, phone_region: &str) -> ContactRecord {
    if html.trim().is_empty() {
        return ContactRecord::default();
    }

    let document = Html::parse_document(html);

    let mut phone_text = visible_text(&document);
    for href in document
        .select(&TEL_LINK)
        .filter_map(|a| a.value().attr("href"))
    {
        phone_text.push('\n');
        phone_text.push_str(&decode_tel(href));
    }

    ContactRecord {
        emails: extract_emails(html),
        phones: extract_phones(&phone_text, phone_region),
        social: extract_social_links(html),
        address: extract_address(&document),
    }
}

/// `tel:` target as plain text (scheme dropped, common escapes undone).
fn decode_tel(href: &str) -> String {
    href.get(4..)
        .unwrap_or_default()
        .replace("%20", " ")
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%28", "(")
        .replace("%29", ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_emails_deduped_and_sorted() {
        let text = "Write to Sales@Acme.io or support@acme.io. Again: sales@acme.io";
        let emails: Vec<_> = extract_emails(text).into_iter().collect();
        assert_eq!(emails, vec!["sales@acme.io", "support@acme.io"]);
    }

    #[test]
    fn test_placeholder_emails_dropped() {
        let text = "you@example.com no-reply@acme.io test@acme.io hello@acme.io";
        let emails: Vec<_> = extract_emails(text).into_iter().collect();
        assert_eq!(emails, vec!["hello@acme.io"]);
    }

    #[test]
    fn test_asset_names_dropped() {
        let html = r#"<img src="/img/logo@2x.png"><img srcset="hero@3x.webp 3x">"#;
        assert!(extract_emails(html).is_empty());
    }

    #[test]
    fn test_mailto_in_markup() {
        let html = r#"<a href="mailto:info@acme.io?subject=Hi">Mail</a>"#;
        assert!(extract_emails(html).contains("info@acme.io"));
    }

    #[test]
    fn test_extract_contacts_combines_sources() {
        let html = r#"<html><body>
            <p>Call us: (415) 555-0132</p>
            <a href="tel:+12125550187">NY office</a>
            <a href="mailto:hello@acme.io">hello@acme.io</a>
            <a href="https://linkedin.com/company/acme">in</a>
            <address>1 Main St, Springfield</address>
            <script>var fake = "+1 650 253 0000";</script>
        </body></html>"#;

        let record = extract_contacts(html, "US");

        assert_eq!(record.primary_email(), Some("hello@acme.io"));
        assert_eq!(record.phones, vec!["+14155550132", "+12125550187"]);
        assert_eq!(
            record.social.linkedin.as_deref(),
            Some("https://linkedin.com/company/acme")
        );
        assert_eq!(record.address.as_deref(), Some("1 Main St, Springfield"));
    }

    #[test]
    fn test_extract_contacts_empty_html() {
        let record = extract_contacts("", "US");
        assert!(record.is_empty());
        assert_eq!(record.social.iter().count(), 6);
    }

    #[test]
    fn test_decode_tel() {
        assert_eq!(decode_tel("tel:%2B1%20415%20555%200132"), "+1 415 555 0132");
        assert_eq!(decode_tel("tel:"), "");
    }

    proptest! {
        #[test]
        fn prop_no_placeholder_emails(
            local in "[a-z0-9._+\\-]{0,12}",
            domain in "(example\\.com|acme\\.io|no-reply\\.net|mail\\.test)",
            prefix in "(test@|no-reply@|)",
        ) {
            let text = format!("{prefix}{local}@{domain} contact {local}test@acme.io");
            for email in extract_emails(&text) {
                prop_assert!(!email.contains("example.com"));
                prop_assert!(!email.contains("no-reply"));
                prop_assert!(!email.contains("test@"));
            }
        }
    }
}
