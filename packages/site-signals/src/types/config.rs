//! Configuration types for guarding, fetching and rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Desktop Chrome identity used when no user agent is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Policy governing one pipeline invocation.
///
/// Constructed once (usually via [`TargetPolicy::from_env`]) and passed
/// by reference into every stage. Nothing in the pipeline mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPolicy {
    /// Allowed URL schemes (lowercase).
    pub allowed_schemes: BTreeSet<String>,

    /// Reject targets resolving to private/reserved/loopback/etc. addresses.
    ///
    /// Default: true.
    pub disallow_private_ips: bool,

    /// User-Agent sent with every request and used for robots evaluation.
    pub user_agent: String,

    /// Timeout for the static fetch and the robots fetch.
    pub timeout: Duration,

    /// Maximum redirects followed by the static fetcher.
    pub max_redirects: usize,

    /// Maximum body size in bytes, applied before and after decoding.
    pub max_bytes: usize,

    /// Enable the headless rendering fallback.
    ///
    /// Default: false.
    pub render_enabled: bool,

    /// Time budget for one rendering attempt.
    pub render_timeout: Duration,

    /// Static HTML shorter than this (in bytes) triggers the renderer.
    pub min_content_length: usize,

    /// Treat an unverifiable robots policy as "allowed".
    ///
    /// Default: true.
    pub robots_fail_open: bool,

    /// Default region (ISO 3166 alpha-2) for numbers without a country code.
    pub phone_region: String,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: ["https", "http"].into_iter().map(String::from).collect(),
            disallow_private_ips: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            max_redirects: 5,
            max_bytes: 10 * 1024 * 1024,
            render_enabled: false,
            render_timeout: Duration::from_secs(15),
            min_content_length: 200,
            robots_fail_open: true,
            phone_region: "US".to_string(),
        }
    }
}

impl TargetPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the allowed scheme set.
    pub fn with_schemes(mut self, schemes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_schemes = schemes
            .into_iter()
            .map(|s| s.into().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    /// Allow or refuse private/reserved targets.
    pub fn with_private_ips_disallowed(mut self, disallow: bool) -> Self {
        self.disallow_private_ips = disallow;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the redirect cap.
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the byte cap.
    pub fn with_max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }

    /// Enable or disable the rendering fallback.
    pub fn with_rendering(mut self, enabled: bool) -> Self {
        self.render_enabled = enabled;
        self
    }

    /// Set the rendering time budget.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Set the minimum static content length before rendering kicks in.
    pub fn with_min_content_length(mut self, len: usize) -> Self {
        self.min_content_length = len;
        self
    }

    /// Set the robots fail-open behaviour.
    pub fn with_robots_fail_open(mut self, fail_open: bool) -> Self {
        self.robots_fail_open = fail_open;
        self
    }

    /// Set the default phone region.
    pub fn with_phone_region(mut self, region: impl Into<String>) -> Self {
        self.phone_region = region.into().to_ascii_uppercase();
        self
    }

    /// Check whether a scheme is allowed.
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(&scheme.to_ascii_lowercase())
    }

    /// Limits for the static fetcher.
    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
            max_redirects: self.max_redirects,
            max_bytes: self.max_bytes,
        }
    }

    /// Limits for the renderer (redirects are the browser's business).
    pub fn render_limits(&self) -> FetchLimits {
        FetchLimits {
            user_agent: self.user_agent.clone(),
            timeout: self.render_timeout,
            max_redirects: self.max_redirects,
            max_bytes: self.max_bytes,
        }
    }

    /// Should the renderer run given the static HTML?
    pub fn needs_rendering(&self, static_html: Option<&str>) -> bool {
        if !self.render_enabled {
            return false;
        }
        match static_html {
            None => true,
            Some(html) => html.len() < self.min_content_length,
        }
    }
}

/// Bounds for one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLimits {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_bytes: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        TargetPolicy::default().fetch_limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment_values() {
        let policy = TargetPolicy::default();
        assert!(policy.allows_scheme("https"));
        assert!(policy.allows_scheme("HTTP"));
        assert!(!policy.allows_scheme("ftp"));
        assert!(policy.disallow_private_ips);
        assert!(policy.robots_fail_open);
        assert!(!policy.render_enabled);
        assert_eq!(policy.max_redirects, 5);
        assert_eq!(policy.min_content_length, 200);
    }

    #[test]
    fn test_with_schemes_normalizes() {
        let policy = TargetPolicy::new().with_schemes([" HTTPS ", "", "http"]);
        assert_eq!(policy.allowed_schemes.len(), 2);
        assert!(policy.allows_scheme("https"));
    }

    #[test]
    fn test_needs_rendering() {
        let disabled = TargetPolicy::new();
        assert!(!disabled.needs_rendering(None));

        let enabled = TargetPolicy::new()
            .with_rendering(true)
            .with_min_content_length(10);
        assert!(enabled.needs_rendering(None));
        assert!(enabled.needs_rendering(Some("<p></p>")));
        assert!(!enabled.needs_rendering(Some("<p>long enough</p>")));
    }

    #[test]
    fn test_render_limits_use_render_timeout() {
        let policy = TargetPolicy::new()
            .with_timeout(Duration::from_secs(3))
            .with_render_timeout(Duration::from_secs(9));
        assert_eq!(policy.fetch_limits().timeout, Duration::from_secs(3));
        assert_eq!(policy.render_limits().timeout, Duration::from_secs(9));
    }
}
