//! The guarded fetch and extraction pipeline.
//!
//! URL → guard → robots → static fetch → (maybe) render → parse → contacts.
//!
//! Only the guard can fail the run. Every later stage degrades: a robots
//! refusal returns an empty result, and fetch or render failures leave
//! whatever content was obtained (possibly none).

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GuardResult;
use crate::extract::{extract_contacts, parse_content};
use crate::fetch::{check_robots, FallbackRenderer, HttpFetcher, RobotsDecision};
use crate::security::UrlGuard;
use crate::traits::Fetcher;
use crate::types::{ContactRecord, ExtractedContent, FetchResult, NormalizedUrl, TargetPolicy};

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub target: NormalizedUrl,
    pub robots: RobotsDecision,

    /// The attempt whose HTML was parsed; `None` when robots refused
    pub fetch: Option<FetchResult>,

    pub content: ExtractedContent,
    pub contacts: ContactRecord,
}

impl PipelineOutput {
    fn refused(target: NormalizedUrl, robots: RobotsDecision) -> Self {
        Self {
            target,
            robots,
            fetch: None,
            content: ExtractedContent::default(),
            contacts: ContactRecord::default(),
        }
    }

    pub fn robots_allowed(&self) -> bool {
        self.robots.allowed
    }

    /// Final URL after redirects, or the normalized target if nothing was fetched.
    pub fn final_url(&self) -> &str {
        self.fetch
            .as_ref()
            .map(|f| f.final_url.as_str())
            .unwrap_or_else(|| self.target.as_str())
    }

    /// Status of the parsed attempt (0 when nothing was fetched).
    pub fn http_status(&self) -> u16 {
        self.fetch.as_ref().map(|f| f.status).unwrap_or(0)
    }
}

/// Runs the pipeline under one immutable policy.
#[derive(Clone)]
pub struct Pipeline {
    policy: TargetPolicy,
    guard: UrlGuard,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<FallbackRenderer>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("policy", &self.policy)
            .field("fetcher", &self.fetcher.name())
            .field("renderer", &self.renderer)
            .finish()
    }
}

impl Pipeline {
    /// Pipeline with the system resolver, the HTTP fetcher and no renderer.
    pub fn new(policy: TargetPolicy) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(&policy));
        Self {
            policy,
            guard: UrlGuard::new(),
            fetcher,
            renderer: None,
        }
    }

    pub fn with_guard(mut self, guard: UrlGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Attach a renderer; it still only runs when the policy enables it.
    pub fn with_renderer(mut self, renderer: FallbackRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn policy(&self) -> &TargetPolicy {
        &self.policy
    }

    /// Guard only: the normalized form `raw` is stored and looked up under.
    pub async fn normalize(&self, raw: &str) -> GuardResult<NormalizedUrl> {
        self.guard.check(raw, &self.policy).await
    }

    /// Guard and robots check only; nothing but robots.txt is fetched.
    pub async fn check(&self, raw: &str) -> GuardResult<(NormalizedUrl, RobotsDecision)> {
        let target = self.normalize(raw).await?;
        let robots = check_robots(self.fetcher.as_ref(), &target, &self.policy).await;
        Ok((target, robots))
    }

    /// Run every stage for `raw`.
    pub async fn run(&self, raw: &str) -> GuardResult<PipelineOutput> {
        let (target, robots) = self.check(raw).await?;

        if !robots.allowed {
            info!(url = %target, basis = ?robots.basis, "robots.txt disallows fetch");
            return Ok(PipelineOutput::refused(target, robots));
        }

        let fetched = self.fetch_page(&target).await;
        let html = fetched.html().unwrap_or_default();

        let content = parse_content(html);
        let contacts = extract_contacts(html, &self.policy.phone_region);

        info!(
            url = %target,
            final_url = %fetched.final_url,
            status = fetched.status,
            source = ?fetched.source,
            has_title = content.title.is_some(),
            emails = contacts.emails.len(),
            phones = contacts.phones.len(),
            "pipeline complete"
        );

        Ok(PipelineOutput {
            target,
            robots,
            fetch: Some(fetched),
            content,
            contacts,
        })
    }

    /// Static fetch, replaced by a rendered capture when the static HTML
    /// is missing or too short and rendering succeeds.
    async fn fetch_page(&self, target: &NormalizedUrl) -> FetchResult {
        let fetched = self.fetcher.fetch(target, &self.policy.fetch_limits()).await;

        if !self.policy.needs_rendering(fetched.html()) {
            return fetched;
        }

        let Some(renderer) = &self.renderer else {
            debug!(url = %target, "rendering wanted but no engine configured");
            return fetched;
        };

        debug!(
            url = %target,
            static_bytes = fetched.html().map(str::len).unwrap_or(0),
            "static content too short, rendering"
        );

        match renderer.render(target, &self.policy.render_limits()).await {
            Ok(rendered) if rendered.html().is_some() => rendered,
            Ok(_) => {
                debug!(url = %target, "rendered page was empty, keeping static result");
                fetched
            }
            Err(e) => {
                warn!(url = %target, error = %e, "rendering failed, keeping static result");
                fetched
            }
        }
    }
}
