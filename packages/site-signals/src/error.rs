//! Typed errors for the site-signals library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Only [`GuardError`]
//! ever reaches the caller of the pipeline; every later stage absorbs its
//! failure and degrades to a sparser result.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Reasons the URL guard refuses a target.
///
/// This is the `RejectedTarget` class: fatal, raised before any network
/// fetch is attempted.
#[derive(Debug, Error)]
pub enum GuardError {
    /// URL could not be parsed at all
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// URL scheme not in the allowed set (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed or returned no addresses
    #[error("could not resolve target host {host}: {reason}")]
    Unresolvable { host: String, reason: String },

    /// Resolved address is in a private/reserved class
    #[error("target {host} resolved to {class} address {ip}")]
    UnsafeAddress {
        host: String,
        ip: IpAddr,
        class: crate::security::AddressClass,
    },
}

impl GuardError {
    /// Stable reason code for callers that map rejections to responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            GuardError::UrlParse(_) => "invalid_url",
            GuardError::DisallowedScheme(_) => "bad_scheme",
            GuardError::NoHost => "no_host",
            GuardError::Unresolvable { .. } => "unresolvable_host",
            GuardError::UnsafeAddress { .. } => "unsafe_ip",
        }
    }
}

/// Errors raised inside the static fetcher.
///
/// These never leave the fetcher as errors; they are logged and folded
/// into a `FetchResult` with status 0.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection or read timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Redirect chain was rejected
    #[error("redirect rejected: {reason}")]
    Redirect { reason: String },
}

/// Errors raised inside the fallback renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Browser engine could not be started
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Navigation failed
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Rendering exceeded its time budget
    #[error("rendering timed out after {0:?}")]
    Timeout(Duration),

    /// DOM could not be captured
    #[error("content capture failed: {0}")]
    Capture(String),

    /// Session teardown failed
    #[error("browser shutdown failed: {0}")]
    Close(String),
}

/// Errors from the inference collaborator.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Provider is not configured
    #[error("inference provider unavailable")]
    Unavailable,

    /// Provider call failed
    #[error("inference provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider returned something we could not interpret
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Session not found
    #[error("session not found: {id}")]
    NotFound { id: uuid::Uuid },

    /// Backend failure
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from a follow-up question about a stored analysis.
///
/// Unlike an analysis, a conversation has nothing to degrade to, so
/// collaborator failures are returned to the caller.
#[derive(Debug, Error)]
pub enum ConverseError {
    /// No analysis store is attached
    #[error("no analysis store configured")]
    NoStore,

    /// The URL was refused by the guard
    #[error(transparent)]
    Target(#[from] GuardError),

    /// Nothing has been analyzed for this URL
    #[error("no analysis found for {url}")]
    NoAnalysis { url: String },

    /// Inference provider missing or failed
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Session lookup failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment value could not be parsed
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    /// Policy is internally inconsistent
    #[error("invalid policy: {0}")]
    Policy(String),
}

/// Result type alias for guard operations.
pub type GuardResult<T> = std::result::Result<T, GuardError>;

/// Result type alias for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Result type alias for inference operations.
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for follow-up questions.
pub type ConverseResult<T> = std::result::Result<T, ConverseError>;
