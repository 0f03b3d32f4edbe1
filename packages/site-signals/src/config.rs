//! Policy loading from the environment.
//!
//! `.env` is read when present; unset keys keep their defaults and
//! malformed numbers are a [`ConfigError`].

use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::config::TargetPolicy;

impl TargetPolicy {
    /// Load the policy from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a policy from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TargetPolicy::default();

        let mut policy = TargetPolicy {
            timeout: seconds(&lookup, "SCRAPER_TIMEOUT_SECONDS", defaults.timeout)?,
            max_redirects: number(&lookup, "SCRAPER_MAX_REDIRECTS", defaults.max_redirects)?,
            max_bytes: number(&lookup, "SCRAPER_MAX_BYTES", defaults.max_bytes)?,
            user_agent: lookup("SCRAPER_USER_AGENT")
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent.clone()),
            disallow_private_ips: flag(&lookup, "DISALLOW_PRIVATE_IPS", defaults.disallow_private_ips),
            render_enabled: flag(&lookup, "RENDER_ENABLED", defaults.render_enabled),
            render_timeout: seconds(&lookup, "RENDER_TIMEOUT_SECONDS", defaults.render_timeout)?,
            min_content_length: number(
                &lookup,
                "RENDER_MIN_CONTENT_LENGTH",
                defaults.min_content_length,
            )?,
            robots_fail_open: flag(&lookup, "ROBOTS_FAIL_OPEN", defaults.robots_fail_open),
            ..defaults
        };

        if let Some(schemes) = lookup("ALLOWED_SCHEMES") {
            policy = policy.with_schemes(schemes.split(','));
        }
        if let Some(region) = lookup("PHONE_DEFAULT_REGION").filter(|r| !r.trim().is_empty()) {
            policy = policy.with_phone_region(region.trim());
        }

        if policy.allowed_schemes.is_empty() {
            return Err(ConfigError::Policy("ALLOWED_SCHEMES is empty".into()));
        }
        if policy.max_bytes == 0 {
            return Err(ConfigError::Policy("SCRAPER_MAX_BYTES must be positive".into()));
        }

        Ok(policy)
    }
}

fn flag<F>(lookup: &F, key: &'static str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
        None => default,
    }
}

fn number<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected: "a non-negative integer",
            value,
        }),
        None => Ok(default),
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    number(lookup, key, default.as_secs()).map(Duration::from_secs)
}
