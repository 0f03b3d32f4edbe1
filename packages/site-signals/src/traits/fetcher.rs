//! Fetcher trait for bounded static retrieval.

use async_trait::async_trait;

use crate::types::{FetchLimits, FetchResult, NormalizedUrl};

/// Static page retrieval.
///
/// Implementations never fail past this boundary: transport errors,
/// timeouts and rejected redirects are logged and reported as a
/// [`FetchResult`] with status 0 and no HTML.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a guarded target within `limits`.
    ///
    /// The returned HTML, once decoded, is at most `limits.max_bytes` long.
    async fn fetch(&self, target: &NormalizedUrl, limits: &FetchLimits) -> FetchResult;

    /// Get the fetcher name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}
