//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::AnalysisStore;
use crate::types::{AnalysisReport, PageSnapshot, QaExchange, SessionSummary};

/// One session per normalized URL, with its snapshot and follow-up history.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    by_url: RwLock<HashMap<String, Uuid>>,
}

struct Session {
    summary: SessionSummary,
    report: AnalysisReport,
    snapshots: Vec<PageSnapshot>,
    exchanges: Vec<QaExchange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            by_url: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.sessions.write().unwrap().clear();
        self.by_url.write().unwrap().clear();
    }

    /// Get the number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn record(&self, report: &AnalysisReport, snapshot: &PageSnapshot) -> StoreResult<Uuid> {
        let mut by_url = self.by_url.write().unwrap();
        let mut sessions = self.sessions.write().unwrap();
        let now = Utc::now();

        if let Some(session) = by_url.get(&report.url).and_then(|id| sessions.get_mut(id)) {
            let id = session.summary.id;
            // Keep earlier answers unless this run produced new ones
            let answers = if report.answers.is_empty() {
                std::mem::take(&mut session.report.answers)
            } else {
                report.answers.clone()
            };

            session.report = AnalysisReport {
                id,
                answers,
                ..report.clone()
            };
            session.snapshots.push(snapshot.clone());
            session.summary.updated_at = now;
            session.summary.snapshot_count = session.snapshots.len();
            return Ok(id);
        }

        let id = Uuid::new_v4();
        sessions.insert(
            id,
            Session {
                summary: SessionSummary {
                    id,
                    url: report.url.clone(),
                    created_at: now,
                    updated_at: now,
                    snapshot_count: 1,
                },
                report: AnalysisReport {
                    id,
                    ..report.clone()
                },
                snapshots: vec![snapshot.clone()],
                exchanges: Vec::new(),
            },
        );
        by_url.insert(report.url.clone(), id);
        Ok(id)
    }

    async fn list_sessions(&self, limit: usize) -> StoreResult<Vec<SessionSummary>> {
        let mut summaries: Vec<_> = self
            .sessions
            .read()
            .unwrap()
            .values()
            .map(|s| s.summary.clone())
            .collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);

        Ok(summaries)
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<AnalysisReport> {
        self.sessions
            .read()
            .unwrap()
            .get(&id)
            .map(|s| s.report.clone())
            .ok_or(StoreError::NotFound { id })
    }

    async fn snapshots(&self, id: Uuid) -> StoreResult<Vec<PageSnapshot>> {
        self.sessions
            .read()
            .unwrap()
            .get(&id)
            .map(|s| s.snapshots.clone())
            .ok_or(StoreError::NotFound { id })
    }

    async fn find_by_url(&self, url: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.by_url.read().unwrap().get(url).copied())
    }

    async fn record_exchange(&self, exchange: &QaExchange) -> StoreResult<()> {
        let id = exchange.session_id;
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        session.exchanges.push(exchange.clone());
        session.summary.updated_at = Utc::now();
        Ok(())
    }

    async fn exchanges(&self, id: Uuid) -> StoreResult<Vec<QaExchange>> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions.get(&id).ok_or(StoreError::NotFound { id })?;

        let mut exchanges = session.exchanges.clone();
        exchanges.sort_by(|a, b| a.asked_at.cmp(&b.asked_at));
        Ok(exchanges)
    }
}
