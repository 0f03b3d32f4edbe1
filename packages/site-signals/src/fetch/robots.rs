//! Robots.txt parser and checker.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::traits::Fetcher;
use crate::types::{FetchLimits, NormalizedUrl, TargetPolicy};

/// Robots documents larger than this are cut before parsing.
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    /// Rules per user-agent token (lowercase)
    rules: HashMap<String, AgentRules>,

    /// Default rules (for *)
    default_rules: Option<AgentRules>,

    /// First crawl delay seen in the file, in seconds
    crawl_delay: Option<f64>,

    /// Sitemaps listed
    sitemaps: Vec<String>,
}

/// Rules for a specific user-agent.
#[derive(Debug, Clone, Default)]
pub struct AgentRules {
    rules: Vec<Rule>,

    /// Crawl delay for this agent
    crawl_delay: Option<f64>,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    allow: bool,
}

impl AgentRules {
    fn merge(&mut self, other: &AgentRules) {
        self.rules.extend(other.rules.iter().cloned());
        if self.crawl_delay.is_none() {
            self.crawl_delay = other.crawl_delay;
        }
    }

    /// Longest matching pattern decides; `Allow` wins a tie.
    fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;

        for rule in &self.rules {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow))
                    if best_len > len || (best_len == len && best_allow) =>
                {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }

        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

impl RobotsTxt {
    /// Parse robots.txt content.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules = AgentRules::default();
        // A group ends at the first rule line; a following user-agent starts a new one
        let mut in_rules = false;

        for line in content.lines() {
            // Strip comments
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_rules {
                        robots.store_group(&current_agents, &current_rules);
                        current_rules = AgentRules::default();
                        current_agents.clear();
                        in_rules = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" | "allow" => {
                    in_rules = true;
                    // An empty Disallow allows everything; it adds no rule
                    if !value.is_empty() {
                        current_rules.rules.push(Rule {
                            pattern: value.to_string(),
                            allow: directive == "allow",
                        });
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    if let Ok(delay) = value.parse::<f64>() {
                        if delay.is_finite() && delay >= 0.0 {
                            current_rules.crawl_delay = Some(delay);
                            if robots.crawl_delay.is_none() {
                                robots.crawl_delay = Some(delay);
                            }
                        }
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        robots.store_group(&current_agents, &current_rules);
        robots
    }

    fn store_group(&mut self, agents: &[String], rules: &AgentRules) {
        for agent in agents {
            if agent == "*" {
                self.default_rules
                    .get_or_insert_with(AgentRules::default)
                    .merge(rules);
            } else {
                self.rules.entry(agent.clone()).or_default().merge(rules);
            }
        }
    }

    /// Rules for a user-agent string, falling back to `*`.
    ///
    /// Groups are matched against the product token only (the agent up to
    /// its first `/`), so `Safari` in a browser-style agent string never
    /// selects a `User-agent: Safari` group. Among groups whose token
    /// appears in the product token, the longest wins.
    fn rules_for(&self, user_agent: &str) -> Option<&AgentRules> {
        let product = product_token(user_agent);

        self.rules
            .get(&product)
            .or_else(|| {
                self.rules
                    .iter()
                    .filter(|(k, _)| !k.is_empty() && product.contains(k.as_str()))
                    .max_by_key(|(k, _)| k.len())
                    .map(|(_, v)| v)
            })
            .or(self.default_rules.as_ref())
    }

    /// Check if a path (with optional query) is allowed for a user-agent.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        match self.rules_for(user_agent) {
            Some(rules) => rules.is_allowed(path),
            None => true,
        }
    }

    /// Get crawl delay for a user-agent.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let delay = self
            .rules_for(user_agent)
            .and_then(|r| r.crawl_delay)
            .or(self.crawl_delay);

        delay.map(Duration::from_secs_f64)
    }

    /// Get listed sitemaps.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }

    /// A policy that refuses every path.
    pub fn deny_all() -> Self {
        Self::parse("User-agent: *\nDisallow: /")
    }
}

/// `Mozilla/5.0 (X11; ...)` -> `mozilla`.
fn product_token(user_agent: &str) -> String {
    user_agent
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Match a robots pattern against a path.
///
/// `*` matches any run of characters; a trailing `$` anchors the end.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut pieces = pattern.split('*');
    let first = pieces.next().unwrap_or_default();
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let mut last_piece_end = pos;

    let rest: Vec<&str> = pieces.collect();
    for (i, piece) in rest.iter().enumerate() {
        if piece.is_empty() {
            if i == rest.len() - 1 {
                // Trailing star swallows the remainder
                return true;
            }
            continue;
        }
        // The final piece of an anchored pattern must sit at the very end
        if anchored && i == rest.len() - 1 {
            return path.len() >= pos + piece.len() && path[pos..].ends_with(piece);
        }
        match path[pos..].find(piece) {
            Some(idx) => {
                pos += idx + piece.len();
                last_piece_end = pos;
            }
            None => return false,
        }
    }

    !anchored || last_piece_end == path.len()
}

/// What the robots verdict was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsBasis {
    /// Parsed rules from a 2xx robots.txt
    Rules,
    /// 4xx other than 401/403: no restrictions
    Missing,
    /// 401/403: treated as disallow-all
    AccessDenied,
    /// Timeout, transport failure or 5xx; resolved by the fail-open flag
    Unavailable,
}

/// Outcome of the robots check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotsDecision {
    pub allowed: bool,
    pub basis: RobotsBasis,
    pub crawl_delay: Option<Duration>,
    pub sitemaps: Vec<String>,
}

impl RobotsDecision {
    fn bare(allowed: bool, basis: RobotsBasis) -> Self {
        Self {
            allowed,
            basis,
            crawl_delay: None,
            sitemaps: Vec::new(),
        }
    }
}

/// Fetch `/robots.txt` at the target's origin and evaluate it for the
/// policy's user agent.
///
/// The robots request goes through the same fetcher (and the same pinned
/// address) as the page itself.
pub async fn check_robots(
    fetcher: &dyn Fetcher,
    target: &NormalizedUrl,
    policy: &TargetPolicy,
) -> RobotsDecision {
    let robots_target = target.robots_target();
    let limits = FetchLimits {
        max_bytes: policy.max_bytes.min(MAX_ROBOTS_BYTES),
        ..policy.fetch_limits()
    };

    let result = fetcher.fetch(&robots_target, &limits).await;
    let path = target.path_and_query();

    let decision = match result.status {
        200..=299 => {
            let robots = RobotsTxt::parse(result.html.as_deref().unwrap_or_default());
            RobotsDecision {
                allowed: robots.is_allowed(&policy.user_agent, &path),
                basis: RobotsBasis::Rules,
                crawl_delay: robots.crawl_delay(&policy.user_agent),
                sitemaps: robots.sitemaps().to_vec(),
            }
        }
        401 | 403 => RobotsDecision::bare(false, RobotsBasis::AccessDenied),
        400..=499 => RobotsDecision::bare(true, RobotsBasis::Missing),
        status => {
            warn!(
                url = %robots_target,
                status,
                fail_open = policy.robots_fail_open,
                "robots.txt unavailable"
            );
            RobotsDecision::bare(policy.robots_fail_open, RobotsBasis::Unavailable)
        }
    };

    debug!(
        url = %target,
        allowed = decision.allowed,
        basis = ?decision.basis,
        "robots check complete"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_USER_AGENT;

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://acme.test/sitemap.xml
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed("TestBot", "/public/page"));
        assert!(!robots.is_allowed("TestBot", "/private/page"));
        assert!(!robots.is_allowed("TestBot", "/admin/"));
        assert!(robots.is_allowed("TestBot", "/other/page"));

        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(2)));
        assert_eq!(robots.sitemaps(), ["https://acme.test/sitemap.xml"]);
    }

    #[test]
    fn test_specific_user_agent() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: goodbot
Disallow:
Allow: /
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("BadBot", "/page"));
        assert!(robots.is_allowed("GoodBot", "/page"));
        assert!(robots.is_allowed("GoodBot/1.0 (+https://goodbot.test)", "/page"));
        // Tokens in the comment part do not select a group
        assert!(!robots.is_allowed("Mozilla/5.0 (compatible; GoodBot/1.0)", "/page"));
    }

    #[test]
    fn test_browser_tokens_do_not_capture_default_agent() {
        let robots = RobotsTxt::parse("User-agent: safari\nDisallow: /\n");
        assert!(robots.is_allowed(DEFAULT_USER_AGENT, "/"));

        let content = r#"
User-agent: Chrome
User-agent: AppleWebKit
User-agent: Windows
Disallow: /

User-agent: *
Disallow: /private/
        "#;
        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed(DEFAULT_USER_AGENT, "/about"));
        assert!(!robots.is_allowed(DEFAULT_USER_AGENT, "/private/x"));
    }

    #[test]
    fn test_product_token_group_applies() {
        let content = r#"
User-agent: mozilla
Disallow: /no-browsers/

User-agent: *
Disallow: /
        "#;
        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed(DEFAULT_USER_AGENT, "/about"));
        assert!(!robots.is_allowed(DEFAULT_USER_AGENT, "/no-browsers/x"));
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token(DEFAULT_USER_AGENT), "mozilla");
        assert_eq!(product_token("GoodBot"), "goodbot");
        assert_eq!(product_token(" Site-Signals/0.1 "), "site-signals");
        assert_eq!(product_token(""), "");
    }

    #[test]
    fn test_grouped_agents_share_rules() {
        let content = r#"
User-agent: alpha
User-agent: beta
Disallow: /shared/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("alpha", "/shared/x"));
        assert!(!robots.is_allowed("beta", "/shared/x"));
        assert!(robots.is_allowed("gamma", "/shared/x"));
    }

    #[test]
    fn test_longer_allow_overrides_disallow() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/public/
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("Bot", "/private/secret"));
        assert!(robots.is_allowed("Bot", "/private/public/page"));
    }

    #[test]
    fn test_longer_disallow_beats_allow() {
        let content = r#"
User-agent: *
Allow: /shop
Disallow: /shop/cart
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed("Bot", "/shop/items"));
        assert!(!robots.is_allowed("Bot", "/shop/cart/1"));
    }

    #[test]
    fn test_wildcards() {
        let content = r#"
User-agent: *
Disallow: /*.pdf$
Disallow: /search*q=
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("Bot", "/files/report.pdf"));
        assert!(robots.is_allowed("Bot", "/files/report.pdf.html"));
        assert!(!robots.is_allowed("Bot", "/search?q=acme"));
        assert!(robots.is_allowed("Bot", "/search"));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("/", "/anything"));
        assert!(pattern_matches("/a*", "/abc"));
        assert!(pattern_matches("/a*c$", "/abc"));
        assert!(!pattern_matches("/a*c$", "/abcd"));
        assert!(pattern_matches("/exact$", "/exact"));
        assert!(!pattern_matches("/exact$", "/exact/more"));
        assert!(!pattern_matches("/b", "/a"));
    }

    #[test]
    fn test_empty_robots() {
        let robots = RobotsTxt::parse("");

        assert!(robots.is_allowed("AnyBot", "/any/path"));
        assert!(robots.crawl_delay("AnyBot").is_none());
    }

    #[test]
    fn test_disallow_all() {
        let content = r#"
User-agent: *
Disallow: / # everything
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.disallows_all("Bot"));
        assert!(!robots.is_allowed("Bot", "/anything"));
        assert!(RobotsTxt::deny_all().disallows_all("Bot"));
    }

    #[test]
    fn test_garbage_allows() {
        let robots = RobotsTxt::parse("<html><body>Not found</body></html>\n\0\0");
        assert!(robots.is_allowed("Bot", "/"));
    }
}
