//! Browser abstraction for the rendering fallback.
//!
//! The renderer only needs four things from a browser: start an isolated
//! session, navigate and wait for the network to settle, read back the
//! DOM, and tear everything down. Keeping that behind a trait lets the
//! lifecycle guarantees be tested without a real browser.

use async_trait::async_trait;

use crate::error::RenderResult;

/// Result of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// URL after any redirects the browser followed
    pub final_url: String,

    /// Main document status (0 when the engine could not tell)
    pub status: u16,
}

/// Starts isolated browsing sessions.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Launch a fresh, ephemeral session (context plus engine process).
    async fn launch(&self, user_agent: &str) -> RenderResult<Box<dyn BrowserSession>>;

    /// Get the engine name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

/// One isolated browsing session.
///
/// `close` must release every resource the session holds and must be
/// safe to call more than once.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait until network activity settles.
    async fn navigate(&mut self, url: &str) -> RenderResult<Navigation>;

    /// Serialize the current DOM as HTML.
    async fn content(&mut self) -> RenderResult<String>;

    /// Release the context and the underlying engine process.
    async fn close(&mut self) -> RenderResult<()>;
}
