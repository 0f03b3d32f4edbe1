//! Fetch results and page snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::content::ExtractedContent;

/// Which stage produced a [`FetchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    Static,
    Rendered,
}

/// Outcome of one retrieval attempt.
///
/// `status == 0` means the transport failed; `html` is then `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code (0 = transport failure)
    pub status: u16,

    /// Decoded body, never longer than the byte cap
    pub html: Option<String>,

    pub source: FetchSource,
}

impl FetchResult {
    /// A transport failure for `url`.
    pub fn failed(url: impl Into<String>, source: FetchSource) -> Self {
        Self {
            final_url: url.into(),
            status: 0,
            html: None,
            source,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    /// Body if it has any non-whitespace content.
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Truncate a decoded string to at most `max_bytes`, on a char boundary.
pub fn truncate_to_bytes(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut cut = max_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// A point-in-time record of what a fetch produced.
///
/// Snapshots are appended, never updated, so a session keeps its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub final_url: String,
    pub http_status: u16,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub main_text: Option<String>,

    /// SHA-256 of the main text (empty string when absent)
    pub content_hash: String,

    pub captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    pub fn new(final_url: impl Into<String>, http_status: u16, content: &ExtractedContent) -> Self {
        Self {
            final_url: final_url.into(),
            http_status,
            title: content.title.clone(),
            meta_description: content.meta_description.clone(),
            main_text: content.main_text.clone(),
            content_hash: Self::hash_content(content.main_text.as_deref().unwrap_or("")),
            captured_at: Utc::now(),
        }
    }

    /// Calculate SHA-256 hash of content.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
