//! Inference trait for the language-model collaborator.
//!
//! The pipeline only hands over extracted main text (and optional
//! questions). Provider selection, prompting and response parsing live
//! in implementations outside this crate.

use async_trait::async_trait;

use crate::error::InferenceResult;
use crate::types::{InferredAttributes, QaItem};

/// Language-model operations used after extraction.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Infer industry, company size, location and target audience.
    async fn infer_attributes(&self, text: &str) -> InferenceResult<InferredAttributes>;

    /// Answer free-form questions about the text.
    async fn answer_questions(
        &self,
        text: &str,
        questions: &[String],
    ) -> InferenceResult<Vec<QaItem>>;

    /// Provider name (for logging/debugging).
    fn provider(&self) -> &str {
        "unknown"
    }
}
