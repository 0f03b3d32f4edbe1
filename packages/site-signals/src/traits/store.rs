//! Storage trait for analysis results.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{AnalysisReport, PageSnapshot, QaExchange, SessionSummary};

/// Persistence collaborator.
///
/// Receives finished reports keyed by normalized URL. Upsert and history
/// semantics are up to the implementation.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Record a report and its snapshot, returning the session id.
    async fn record(&self, report: &AnalysisReport, snapshot: &PageSnapshot) -> StoreResult<Uuid>;

    /// Most recent sessions first.
    async fn list_sessions(&self, limit: usize) -> StoreResult<Vec<SessionSummary>>;

    /// Latest report for a session.
    async fn get_session(&self, id: Uuid) -> StoreResult<AnalysisReport>;

    /// Snapshot history for a session, oldest first.
    async fn snapshots(&self, id: Uuid) -> StoreResult<Vec<PageSnapshot>>;

    /// Session recorded for a normalized URL, if any.
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<Uuid>>;

    /// Append a follow-up exchange to its session's history.
    async fn record_exchange(&self, exchange: &QaExchange) -> StoreResult<()>;

    /// Follow-up history for a session, oldest first.
    async fn exchanges(&self, id: Uuid) -> StoreResult<Vec<QaExchange>>;
}
