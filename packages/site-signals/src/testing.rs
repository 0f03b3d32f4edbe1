//! Testing utilities including mock implementations.
//!
//! These let applications (and this crate's own tests) drive the pipeline
//! without DNS, network, a browser or a language model.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{InferenceError, InferenceResult, RenderError, RenderResult};
use crate::security::Resolver;
use crate::traits::{BrowserEngine, BrowserSession, Fetcher, Inference, Navigation};
use crate::types::page::truncate_to_bytes;
use crate::types::{
    FetchLimits, FetchResult, FetchSource, InferredAttributes, NormalizedUrl, QaItem,
};

/// Resolver answering from a fixed table.
///
/// Unknown hosts fail like an NXDOMAIN.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a host to addresses (in resolution order).
    pub fn with_host(
        mut self,
        host: impl Into<String>,
        ips: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let ips = ips
            .into_iter()
            .map(|ip| {
                ip.as_ref()
                    .parse()
                    .unwrap_or_else(|_| panic!("invalid IP in StaticResolver: {}", ip.as_ref()))
            })
            .collect();
        self.hosts.insert(host.into().to_ascii_lowercase(), ips);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}")))
    }
}

/// Canned response for a [`MockFetcher`] URL.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Respond with a status and body
    Page { status: u16, html: String },
    /// Transport failure (connection refused, TLS error, ...)
    Fail,
    /// Never answer; the fetch runs into its timeout
    Hang,
}

/// A mock fetcher for testing.
///
/// URLs without a canned response get a 404 with an empty body.
#[derive(Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, MockResponse>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with status 200.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.with_response(
            url,
            MockResponse::Page {
                status: 200,
                html: html.into(),
            },
        )
    }

    /// Serve an arbitrary status and body.
    pub fn with_status(self, url: impl Into<String>, status: u16, html: impl Into<String>) -> Self {
        self.with_response(
            url,
            MockResponse::Page {
                status,
                html: html.into(),
            },
        )
    }

    pub fn with_response(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.responses.write().unwrap().insert(url.into(), response);
        self
    }

    /// Get every URL fetched, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Whether `url` was fetched.
    pub fn fetched(&self, url: &str) -> bool {
        self.calls.read().unwrap().iter().any(|u| u == url)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, target: &NormalizedUrl, limits: &FetchLimits) -> FetchResult {
        let url = target.as_str().to_string();
        self.calls.write().unwrap().push(url.clone());

        let response = self.responses.read().unwrap().get(&url).cloned();
        match response {
            Some(MockResponse::Page { status, html }) => FetchResult {
                final_url: url,
                status,
                html: Some(truncate_to_bytes(html, limits.max_bytes)),
                source: FetchSource::Static,
            },
            Some(MockResponse::Fail) => FetchResult::failed(url, FetchSource::Static),
            Some(MockResponse::Hang) => {
                tokio::time::sleep(limits.timeout).await;
                FetchResult::failed(url, FetchSource::Static)
            }
            None => FetchResult {
                final_url: url,
                status: 404,
                html: Some(String::new()),
                source: FetchSource::Static,
            },
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// How sessions from a [`MockEngine`] behave.
#[derive(Debug, Clone)]
pub enum SessionBehavior {
    /// Navigate and return this DOM
    Succeed(String),
    /// Navigation never completes
    Hang,
    /// Navigation fails with an error
    FailNavigation,
    /// Capturing the DOM panics
    Panic,
    /// The engine fails to start
    FailLaunch,
    /// Starting the engine takes this long, then sessions succeed
    SlowLaunch(Duration),
}

/// A mock browser engine that counts live sessions.
pub struct MockEngine {
    behavior: SessionBehavior,
    launched: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new(behavior: SessionBehavior) -> Self {
        Self {
            behavior,
            launched: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions launched and not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Sessions launched so far.
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    async fn launch(&self, _user_agent: &str) -> RenderResult<Box<dyn BrowserSession>> {
        match &self.behavior {
            SessionBehavior::FailLaunch => {
                return Err(RenderError::Launch("mock engine refused to start".to_string()));
            }
            SessionBehavior::SlowLaunch(delay) => tokio::time::sleep(*delay).await,
            _ => {}
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            behavior: self.behavior.clone(),
            live: Arc::clone(&self.live),
            closed: false,
            url: String::new(),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession {
    behavior: SessionBehavior,
    live: Arc<AtomicUsize>,
    closed: bool,
    url: String,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> RenderResult<Navigation> {
        self.url = url.to_string();
        match &self.behavior {
            SessionBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RenderError::Timeout(Duration::from_secs(3600)))
            }
            SessionBehavior::FailNavigation => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            }),
            _ => Ok(Navigation {
                final_url: url.to_string(),
                status: 0,
            }),
        }
    }

    async fn content(&mut self) -> RenderResult<String> {
        match &self.behavior {
            SessionBehavior::Succeed(html) => Ok(html.clone()),
            SessionBehavior::SlowLaunch(_) => Ok("<html><body><p>late start</p></body></html>".to_string()),
            SessionBehavior::Panic => panic!("mock renderer crashed on {}", self.url),
            _ => Err(RenderError::Capture("no document".to_string())),
        }
    }

    async fn close(&mut self) -> RenderResult<()> {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A mock inference provider for testing.
#[derive(Default)]
pub struct MockInference {
    attributes: InferredAttributes,
    answer: Option<String>,
    fail: bool,

    /// Texts received, for assertions
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes returned by `infer_attributes`.
    pub fn with_attributes(mut self, attributes: InferredAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Answer given to every question.
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// Make every call fail like an unreachable provider.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Get the texts passed to the provider.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Inference for MockInference {
    async fn infer_attributes(&self, text: &str) -> InferenceResult<InferredAttributes> {
        self.calls.write().unwrap().push(text.to_string());
        if self.fail {
            return Err(InferenceError::Unavailable);
        }
        Ok(self.attributes.clone())
    }

    async fn answer_questions(
        &self,
        text: &str,
        questions: &[String],
    ) -> InferenceResult<Vec<QaItem>> {
        self.calls.write().unwrap().push(text.to_string());
        if self.fail {
            return Err(InferenceError::Unavailable);
        }
        let answer = self.answer.clone().unwrap_or_else(|| "Unknown".to_string());
        Ok(questions
            .iter()
            .map(|q| QaItem::new(q.clone(), answer.clone()))
            .collect())
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
