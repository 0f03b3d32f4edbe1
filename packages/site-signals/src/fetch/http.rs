//! HTTP-based static fetcher.
//!
//! One bounded GET per call:
//! - the connection is pinned to the address the guard classified, so a
//!   second DNS answer cannot swap in an internal host
//! - redirects are capped; each hop's scheme and literal IP are screened
//!   by the redirect policy, and named hops by [`GuardedDns`]
//! - the body is read in chunks and cut at the byte cap before decoding

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use regex::bytes::Regex as BytesRegex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::security::{screen_redirect, GuardedDns, Resolver, SystemResolver};
use crate::traits::Fetcher;
use crate::types::page::truncate_to_bytes;
use crate::types::{FetchLimits, FetchResult, FetchSource, NormalizedUrl, TargetPolicy};

/// How far into the body we look for a `<meta charset>`.
const CHARSET_SNIFF_BYTES: usize = 1024;

lazy_static! {
    static ref META_CHARSET: BytesRegex =
        BytesRegex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-:.]+)"#).unwrap();
}

/// Static fetcher backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    /// Scheme set and private-IP flag used to screen redirect hops
    policy: TargetPolicy,

    /// Resolves redirect hops to hosts other than the target
    resolver: Arc<dyn Resolver>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(&TargetPolicy::default())
    }
}

impl HttpFetcher {
    /// Create a fetcher that screens redirects with `policy`.
    pub fn new(policy: &TargetPolicy) -> Self {
        Self {
            policy: policy.clone(),
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Resolve redirect hops with `resolver` instead of the system.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    fn build_client(
        &self,
        target: &NormalizedUrl,
        limits: &FetchLimits,
    ) -> Result<reqwest::Client, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let policy = self.policy.clone();
        let max_redirects = limits.max_redirects;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                return attempt.error(format!("more than {} redirects", max_redirects));
            }
            match screen_redirect(attempt.url(), &policy) {
                Ok(()) => attempt.follow(),
                Err(reason) => attempt.error(reason),
            }
        });

        let dns = GuardedDns::new(Arc::clone(&self.resolver), &self.policy).pinned_to(target);

        let client = reqwest::Client::builder()
            .user_agent(limits.user_agent.as_str())
            .default_headers(headers)
            .timeout(limits.timeout)
            .connect_timeout(limits.timeout)
            .redirect(redirect)
            .dns_resolver(Arc::new(dns))
            .build()?;

        Ok(client)
    }

    async fn try_fetch(
        &self,
        target: &NormalizedUrl,
        limits: &FetchLimits,
    ) -> Result<FetchResult, FetchError> {
        let client = self.build_client(target, limits)?;

        let response = client
            .get(target.url().clone())
            .send()
            .await
            .map_err(|e| classify_error(e, target))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = read_capped(response, limits.max_bytes)
            .await
            .map_err(|e| classify_error(e, target))?;

        let html = decode_body(&body, content_type.as_deref(), limits.max_bytes);

        debug!(
            url = %target,
            final_url = %final_url,
            status,
            bytes = body.len(),
            "static fetch complete"
        );

        Ok(FetchResult {
            final_url,
            status,
            html: Some(html),
            source: FetchSource::Static,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &NormalizedUrl, limits: &FetchLimits) -> FetchResult {
        // Client timeout already bounds the request; this also covers
        // client construction and slow-drip bodies between chunks.
        let attempt = tokio::time::timeout(limits.timeout, self.try_fetch(target, limits)).await;

        match attempt {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(url = %target, error = %e, "static fetch failed");
                FetchResult::failed(target.as_str(), FetchSource::Static)
            }
            Err(_) => {
                warn!(url = %target, timeout = ?limits.timeout, "static fetch timed out");
                FetchResult::failed(target.as_str(), FetchSource::Static)
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify_error(e: reqwest::Error, target: &NormalizedUrl) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: target.to_string(),
        }
    } else if e.is_redirect() {
        FetchError::Redirect {
            reason: e.to_string(),
        }
    } else {
        FetchError::Http(e)
    }
}

/// Read at most `max_bytes` of the body, dropping the rest unread.
async fn read_capped(mut response: reqwest::Response, max_bytes: usize) -> reqwest::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = max_bytes.saturating_sub(buf.len());
        let take = chunk.len().min(remaining);
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= max_bytes {
            break;
        }
    }

    Ok(buf)
}

/// Decode with the declared or sniffed charset, substituting U+FFFD for
/// undecodable bytes, and re-apply the byte cap to the decoded text.
pub(crate) fn decode_body(body: &[u8], content_type: Option<&str>, max_bytes: usize) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8);

    let (text, actual, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(encoding = actual.name(), "body contained undecodable bytes");
    }

    truncate_to_bytes(text.into_owned(), max_bytes)
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        } else {
            None
        }
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(CHARSET_SNIFF_BYTES)];
    let caps = META_CHARSET.captures(head)?;
    Encoding::for_label(caps.get(1)?.as_bytes())
}
