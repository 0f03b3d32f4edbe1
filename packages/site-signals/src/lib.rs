//! Guarded Site Signal Extraction Library
//!
//! Takes an arbitrary, user-supplied URL, retrieves it safely and pulls
//! out structured business signals (title, summary text, contact details,
//! social links, postal address) for downstream language-model inference.
//!
//! # Stages
//!
//! 1. **URL guard** - scheme check, DNS resolution, unsafe-address rejection
//! 2. **Robots check** - `/robots.txt` evaluation, fail-open by default
//! 3. **Static fetch** - bounded GET pinned to the guarded address
//! 4. **Rendering fallback** - headless browser for near-empty pages
//! 5. **Content parser** - title, meta description, readable main text
//! 6. **Contact extractor** - emails, phones, social links, address
//!
//! Only the guard can fail a run; every later stage degrades to a sparser
//! result.
//!
//! # Usage
//!
//! ```rust,ignore
//! use site_signals::{Analyzer, MemoryStore, Pipeline, TargetPolicy};
//! use std::sync::Arc;
//!
//! let policy = TargetPolicy::from_env()?;
//! let analyzer = Analyzer::new(Pipeline::new(policy))
//!     .with_store(Arc::new(MemoryStore::new()));
//!
//! let report = analyzer.analyze("https://acme.test", &[]).await?;
//! println!("{:?}", report.contacts.primary_email());
//! ```
//!
//! # Modules
//!
//! - [`security`] - URL guard and address classification
//! - [`fetch`] - HTTP fetcher, robots check, rendering fallback
//! - [`extract`] - Pure HTML extractors
//! - [`pipeline`] - Stage orchestration
//! - [`analysis`] - Inference and persistence on top of the pipeline
//! - [`traits`] - Seams for fetchers, browsers, inference and storage
//! - [`stores`] - Storage implementations (MemoryStore)
//! - [`testing`] - Mock implementations for testing

pub mod analysis;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    ConfigError, ConverseError, FetchError, GuardError, InferenceError, RenderError, StoreError,
};
pub use traits::{AnalysisStore, BrowserEngine, BrowserSession, Fetcher, Inference, Navigation};
pub use types::{
    AnalysisReport, ContactRecord, ExtractedContent, FetchLimits, FetchResult, FetchSource,
    InferredAttributes, NormalizedUrl, PageSnapshot, QaExchange, QaItem, SessionRef,
    SessionSummary, SocialLinks, SocialPlatform, TargetPolicy,
};

pub use analysis::{build_context, Analyzer, MAX_CONTEXT_CHARS};
pub use pipeline::{Pipeline, PipelineOutput};

// Re-export stages
pub use extract::{extract_contacts, extract_emails, extract_phones, extract_social_links, parse_content};
pub use fetch::{check_robots, FallbackRenderer, HttpFetcher, RobotsDecision, RobotsTxt};
pub use security::{AddressClass, GuardedDns, UrlGuard};

#[cfg(feature = "headless")]
pub use fetch::ChromiumEngine;

// Re-export stores
pub use stores::MemoryStore;
