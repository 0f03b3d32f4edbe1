//! Analysis reports handed to callers and to storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::contact::ContactRecord;
use crate::types::content::ExtractedContent;

/// Attributes inferred by the language-model collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredAttributes {
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub location: Option<String>,
    pub target_audience: Option<String>,
}

impl InferredAttributes {
    pub fn is_empty(&self) -> bool {
        self.industry.is_none()
            && self.company_size.is_none()
            && self.location.is_none()
            && self.target_audience.is_none()
    }
}

/// A question and the collaborator's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaItem {
    pub question: String,
    pub answer: String,
}

impl QaItem {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Everything one analysis produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Session id (assigned by the store, or fresh when nothing is stored)
    pub id: Uuid,

    /// Normalized target URL
    pub url: String,

    /// URL the content actually came from
    pub final_url: String,

    /// 0 when nothing was fetched
    pub http_status: u16,

    pub analyzed_at: DateTime<Utc>,

    /// False when robots.txt disallowed the fetch
    pub robots_allowed: bool,

    pub content: ExtractedContent,
    pub contacts: ContactRecord,
    pub attributes: InferredAttributes,

    #[serde(default)]
    pub answers: Vec<QaItem>,
}

/// Row in a session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub snapshot_count: usize,
}

/// One follow-up question asked against a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaExchange {
    pub session_id: Uuid,

    /// Normalized URL of the session
    pub url: String,

    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// How a follow-up question names its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    Id(Uuid),

    /// Raw URL; normalized by the guard before lookup
    Url(String),
}

impl From<Uuid> for SessionRef {
    fn from(id: Uuid) -> Self {
        SessionRef::Id(id)
    }
}

impl From<&str> for SessionRef {
    fn from(url: &str) -> Self {
        SessionRef::Url(url.to_string())
    }
}

impl From<String> for SessionRef {
    fn from(url: String) -> Self {
        SessionRef::Url(url)
    }
}
