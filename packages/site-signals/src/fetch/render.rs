//! Rendering fallback for JavaScript-heavy pages.
//!
//! A browser session is the one resource in the pipeline that can leak:
//! an orphaned session keeps a whole engine process alive. Sessions are
//! therefore only ever held through [`SessionGuard`], which is closed
//! explicitly on every normal path and closes itself from `Drop` when a
//! task unwinds or is cancelled. A launch still in flight is held by
//! [`PendingLaunch`], which closes the session it eventually yields if
//! nobody is left to take it.

use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{RenderError, RenderResult};
use crate::traits::{BrowserEngine, BrowserSession};
use crate::types::page::truncate_to_bytes;
use crate::types::{FetchLimits, FetchResult, FetchSource, NormalizedUrl};

/// Owns a live browser session until it is closed.
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
    url: String,
    runtime_handle: Handle,
}

impl SessionGuard {
    /// Wrap a freshly launched session. Must be called inside a runtime.
    pub fn new(session: Box<dyn BrowserSession>, url: impl Into<String>) -> Self {
        Self {
            session: Some(session),
            url: url.into(),
            runtime_handle: Handle::current(),
        }
    }

    fn session(&mut self) -> RenderResult<&mut Box<dyn BrowserSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| RenderError::Close("session already closed".to_string()))
    }

    /// Close the session, consuming the guard.
    pub async fn close(mut self) -> RenderResult<()> {
        match self.session.take() {
            Some(mut session) => {
                let result = session.close().await;
                match &result {
                    Ok(()) => trace!(url = %self.url, "browser session closed"),
                    Err(e) => warn!(url = %self.url, error = %e, "browser session close failed"),
                }
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let url = std::mem::take(&mut self.url);
            debug!(url = %url, "closing browser session from drop");
            self.runtime_handle.spawn(async move {
                if let Err(e) = session.close().await {
                    warn!(url = %url, error = %e, "browser session drop cleanup failed");
                }
            });
        }
    }
}

type LaunchResult = RenderResult<Box<dyn BrowserSession>>;

/// A browser launch running on its own task.
///
/// Dropped before the session is taken (deadline passed, caller
/// cancelled), it leaves a task behind that closes the session once the
/// launch finishes.
pub struct PendingLaunch {
    handle: Option<JoinHandle<LaunchResult>>,
    url: String,
    runtime_handle: Handle,
}

impl PendingLaunch {
    /// Start launching a session. Must be called inside a runtime.
    pub fn spawn(engine: Arc<dyn BrowserEngine>, user_agent: String, url: impl Into<String>) -> Self {
        let handle = tokio::spawn(async move { engine.launch(&user_agent).await });
        Self {
            handle: Some(handle),
            url: url.into(),
            runtime_handle: Handle::current(),
        }
    }

    /// The launch outcome, or `None` if `deadline` passed first.
    pub async fn wait_until(&mut self, deadline: Instant) -> Option<LaunchResult> {
        let handle = self.handle.as_mut()?;
        let joined = tokio::time::timeout_at(deadline, handle).await.ok()?;
        self.handle = None;

        Some(joined.unwrap_or_else(|e| Err(RenderError::Launch(format!("launch task failed: {e}")))))
    }
}

impl Drop for PendingLaunch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let url = std::mem::take(&mut self.url);
            self.runtime_handle.spawn(async move {
                if let Ok(Ok(mut session)) = handle.await {
                    debug!(url = %url, "closing browser session from an abandoned launch");
                    if let Err(e) = session.close().await {
                        warn!(url = %url, error = %e, "abandoned launch cleanup failed");
                    }
                }
            });
        }
    }
}

/// Runs a page in a headless browser when static HTML is not enough.
#[derive(Clone)]
pub struct FallbackRenderer {
    engine: Arc<dyn BrowserEngine>,
}

impl std::fmt::Debug for FallbackRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRenderer")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl FallbackRenderer {
    pub fn new(engine: Arc<dyn BrowserEngine>) -> Self {
        Self { engine }
    }

    /// Render `target` within `limits.timeout`, browser launch included.
    ///
    /// The session is released before this returns, whatever the outcome;
    /// a launch that completes after the deadline is closed in the background.
    /// A panic inside the engine is reported as a capture error.
    pub async fn render(
        &self,
        target: &NormalizedUrl,
        limits: &FetchLimits,
    ) -> RenderResult<FetchResult> {
        // Launch and capture share one budget
        let deadline = Instant::now() + limits.timeout;

        let mut launch = PendingLaunch::spawn(
            Arc::clone(&self.engine),
            limits.user_agent.clone(),
            target.as_str(),
        );
        let session = match launch.wait_until(deadline).await {
            Some(result) => result?,
            None => {
                debug!(url = %target, timeout = ?limits.timeout, "browser launch missed the deadline");
                return Err(RenderError::Timeout(limits.timeout));
            }
        };
        let mut guard = SessionGuard::new(session, target.as_str());

        let work = std::panic::AssertUnwindSafe(capture(&mut guard, target, limits.max_bytes))
            .catch_unwind();
        let outcome = match tokio::time::timeout_at(deadline, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RenderError::Capture("browser engine panicked".to_string())),
            Err(_) => Err(RenderError::Timeout(limits.timeout)),
        };

        // Close failures are logged by the guard and do not discard a capture
        let _ = guard.close().await;

        if let Ok(result) = &outcome {
            debug!(
                url = %target,
                engine = self.engine.name(),
                final_url = %result.final_url,
                bytes = result.html.as_ref().map(String::len).unwrap_or(0),
                "render complete"
            );
        }
        outcome
    }
}

async fn capture(
    guard: &mut SessionGuard,
    target: &NormalizedUrl,
    max_bytes: usize,
) -> RenderResult<FetchResult> {
    let session = guard.session()?;
    let nav = session.navigate(target.as_str()).await?;
    let html = session.content().await?;

    Ok(FetchResult {
        final_url: nav.final_url,
        // The DOM was captured, so the engine reached the page
        status: if nav.status == 0 { 200 } else { nav.status },
        html: Some(truncate_to_bytes(html, max_bytes)),
        source: FetchSource::Rendered,
    })
}

/// A rendered page counts as settled after this long with no request in flight.
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
const NETWORK_IDLE: Duration = Duration::from_millis(500);

/// Return once no request has been in flight for `quiet`.
///
/// `traffic` yields +1 per request started and -1 per request finished
/// or failed. Never returns while a request stays open; the render
/// deadline bounds that case.
#[cfg_attr(not(feature = "headless"), allow(dead_code))]
async fn wait_for_network_idle<S>(mut traffic: S, quiet: Duration)
where
    S: Stream<Item = i64> + Unpin,
{
    let mut in_flight: i64 = 0;
    loop {
        match tokio::time::timeout(quiet, traffic.next()).await {
            Ok(Some(delta)) => in_flight = (in_flight + delta).max(0),
            // Event channel closed with the page
            Ok(None) => return,
            Err(_) if in_flight == 0 => return,
            Err(_) => trace!(in_flight, "waiting for network idle"),
        }
    }
}

#[cfg(feature = "headless")]
pub use chromium::ChromiumEngine;

#[cfg(feature = "headless")]
mod chromium {
    //! Chromium over CDP via `chromiumoxide`.

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
    use chromiumoxide::cdp::browser_protocol::network::{
        EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    };
    use chromiumoxide::Page;
    use futures::stream::{self, BoxStream};
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};

    use super::{wait_for_network_idle, NETWORK_IDLE};
    use crate::error::{RenderError, RenderResult};
    use crate::traits::{BrowserEngine, BrowserSession, Navigation};

    /// Launches one headless Chromium process per session.
    #[derive(Debug, Clone, Default)]
    pub struct ChromiumEngine {
        /// Extra command-line flags for the browser
        args: Vec<String>,
    }

    impl ChromiumEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
            self.args.push(arg.into());
            self
        }
    }

    #[async_trait]
    impl BrowserEngine for ChromiumEngine {
        async fn launch(&self, user_agent: &str) -> RenderResult<Box<dyn BrowserSession>> {
            let mut args = vec![
                "--disable-gpu".to_string(),
                "--no-first-run".to_string(),
                "--disable-extensions".to_string(),
                "--incognito".to_string(),
            ];
            args.extend(self.args.iter().cloned());

            let config = BrowserConfig::builder()
                .args(args)
                .build()
                .map_err(RenderError::Launch)?;

            let (mut browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| RenderError::Launch(e.to_string()))?;

            let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

            let page = match browser.new_page("about:blank").await {
                Ok(page) => page,
                Err(e) => {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                    handler_task.abort();
                    return Err(RenderError::Launch(e.to_string()));
                }
            };
            if let Err(e) = page
                .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
                .await
            {
                warn!(error = %e, "could not set renderer user agent");
            }

            Ok(Box::new(ChromiumSession {
                browser: Some(browser),
                page: Some(page),
                handler_task: Some(handler_task),
            }))
        }

        fn name(&self) -> &str {
            "chromium"
        }
    }

    struct ChromiumSession {
        browser: Option<Browser>,
        page: Option<Page>,
        handler_task: Option<JoinHandle<()>>,
    }

    impl ChromiumSession {
        fn page(&self) -> RenderResult<&Page> {
            self.page
                .as_ref()
                .ok_or_else(|| RenderError::Capture("page already closed".to_string()))
        }
    }

    #[async_trait]
    impl BrowserSession for ChromiumSession {
        async fn navigate(&mut self, url: &str) -> RenderResult<Navigation> {
            let page = self.page()?;
            // Subscribe before navigating so no request event is missed
            let traffic = network_traffic(page).await?;

            page.goto(url).await.map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            wait_for_network_idle(traffic, NETWORK_IDLE).await;

            let status: u16 = page
                .evaluate(
                    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0",
                )
                .await
                .ok()
                .and_then(|r| r.into_value().ok())
                .unwrap_or(0);
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());

            Ok(Navigation { final_url, status })
        }

        async fn content(&mut self) -> RenderResult<String> {
            self.page()?
                .content()
                .await
                .map_err(|e| RenderError::Capture(e.to_string()))
        }

        async fn close(&mut self) -> RenderResult<()> {
            let mut failure = None;

            if let Some(page) = self.page.take() {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "page close failed");
                }
            }
            if let Some(mut browser) = self.browser.take() {
                if let Err(e) = browser.close().await {
                    failure = Some(e.to_string());
                }
                if browser.wait().await.is_err() {
                    if let Some(Err(e)) = browser.kill().await {
                        failure = Some(e.to_string());
                    }
                }
            }
            if let Some(task) = self.handler_task.take() {
                task.abort();
            }

            match failure {
                Some(reason) => Err(RenderError::Close(reason)),
                None => Ok(()),
            }
        }
    }

    /// +1 per request started, -1 per request finished or failed.
    async fn network_traffic(page: &Page) -> RenderResult<BoxStream<'static, i64>> {
        let listen_err = |e: chromiumoxide::error::CdpError| RenderError::Capture(e.to_string());

        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(listen_err)?
            .map(|_| 1);
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listen_err)?
            .map(|_| -1);
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listen_err)?
            .map(|_| -1);

        Ok(stream::select(started, stream::select(finished, failed)).boxed())
    }
}
