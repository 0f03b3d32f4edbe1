//! Phone number discovery, validation and E.164 normalization.

use std::collections::HashSet;

use lazy_static::lazy_static;
use phonenumber::{country, Mode};
use regex::Regex;
use tracing::debug;

/// Region used when the configured one is not a known ISO 3166 code.
const FALLBACK_REGION: country::Id = country::Id::US;

lazy_static! {
    // A phone-like run: optional leading +, digits with common separators
    // on a single line. Validation happens after matching.
    static ref PHONE_CANDIDATE: Regex =
        Regex::new(r"\+?\(?\d[\d \t().\-/]{5,24}\d").unwrap();
}

/// Find valid phone numbers in free text, formatted as E.164.
///
/// Numbers without a country prefix are read in `region` (ISO 3166
/// alpha-2). Duplicates are removed keeping first-seen order.
pub fn extract_phones(text: &str, region: &str) -> Vec<String> {
    let region = parse_region(region);
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for candidate in PHONE_CANDIDATE.find_iter(text) {
        for number in numbers_in_run(candidate.as_str(), region) {
            if seen.insert(number.clone()) {
                found.push(number);
            }
        }
    }

    found
}

fn parse_region(region: &str) -> country::Id {
    region
        .trim()
        .to_ascii_uppercase()
        .parse::<country::Id>()
        .unwrap_or_else(|_| {
            debug!(region, "unknown phone region, using fallback");
            FALLBACK_REGION
        })
}

/// Valid numbers inside one candidate run.
///
/// A run that does not validate as a whole may be two numbers the
/// separator class glued together; it is split at whitespace and the
/// longest valid prefix is taken repeatedly.
fn numbers_in_run(run: &str, region: country::Id) -> Vec<String> {
    if let Some(number) = validate(run, region) {
        return vec![number];
    }

    let tokens: Vec<&str> = run.split_whitespace().collect();
    let mut numbers = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let matched = (start + 1..=tokens.len())
            .rev()
            .find_map(|end| validate(&tokens[start..end].join(" "), region).map(|n| (end, n)));

        match matched {
            Some((end, number)) => {
                numbers.push(number);
                start = end;
            }
            None => start += 1,
        }
    }

    numbers
}

/// Parse, validate and format a single candidate.
fn validate(candidate: &str, region: country::Id) -> Option<String> {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return None;
    }

    let number = phonenumber::parse(Some(region), candidate).ok()?;
    if !phonenumber::is_valid(&number) {
        return None;
    }
    Some(number.format().mode(Mode::E164).to_string())
}
