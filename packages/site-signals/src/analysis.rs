//! Full analysis: pipeline, inference and persistence.
//!
//! Stored sessions can also be asked follow-up questions, answered from
//! the latest snapshot plus what was inferred and extracted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ConverseError, ConverseResult, GuardResult, InferenceError};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::traits::{AnalysisStore, Inference};
use crate::types::{
    AnalysisReport, ContactRecord, InferredAttributes, PageSnapshot, QaExchange, QaItem,
    SessionRef,
};

/// Upper bound on the context handed to the provider for a follow-up.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

/// Runs the pipeline and hands its output to the collaborators.
///
/// Provider and storage failures are logged and never fail the analysis.
pub struct Analyzer {
    pipeline: Pipeline,
    inference: Option<Arc<dyn Inference>>,
    store: Option<Arc<dyn AnalysisStore>>,
}

impl Analyzer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            inference: None,
            store: None,
        }
    }

    pub fn with_inference(mut self, inference: Arc<dyn Inference>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Analyze `url`, optionally answering `questions` about it.
    pub async fn analyze(&self, url: &str, questions: &[String]) -> GuardResult<AnalysisReport> {
        let output = self.pipeline.run(url).await?;

        let (attributes, answers) = match output.content.main_text.as_deref() {
            Some(text) => self.infer(text, questions).await,
            None => (InferredAttributes::default(), Vec::new()),
        };

        let mut report = build_report(output, attributes, answers);

        if let Some(store) = &self.store {
            let snapshot = PageSnapshot::new(&report.final_url, report.http_status, &report.content);
            match store.record(&report, &snapshot).await {
                Ok(session_id) => {
                    info!(url = %report.url, %session_id, "analysis stored");
                    report.id = session_id;
                }
                Err(e) => warn!(url = %report.url, error = %e, "failed to store analysis"),
            }
        }

        Ok(report)
    }

    /// Ask a follow-up question about a stored session.
    ///
    /// The session is named by id or by URL (normalized by the guard). The
    /// exchange is appended to the session's history; failing to store it
    /// is logged and the answer is still returned.
    pub async fn converse(
        &self,
        session: impl Into<SessionRef>,
        question: &str,
    ) -> ConverseResult<QaExchange> {
        let store = self.store.as_ref().ok_or(ConverseError::NoStore)?;
        let inference = self
            .inference
            .as_ref()
            .ok_or(ConverseError::Inference(InferenceError::Unavailable))?;

        let session_id = match session.into() {
            SessionRef::Id(id) => id,
            SessionRef::Url(raw) => {
                let target = self.pipeline.normalize(&raw).await?;
                store
                    .find_by_url(target.as_str())
                    .await?
                    .ok_or_else(|| ConverseError::NoAnalysis {
                        url: target.to_string(),
                    })?
            }
        };

        let report = store.get_session(session_id).await?;
        let snapshots = store.snapshots(session_id).await?;
        let context = build_context(snapshots.last(), &report.attributes, &report.contacts);

        let answer = inference
            .answer_questions(&context, &[question.to_string()])
            .await?
            .into_iter()
            .next()
            .map(|qa| qa.answer)
            .unwrap_or_default();

        let exchange = QaExchange {
            session_id,
            url: report.url,
            question: question.to_string(),
            answer,
            asked_at: Utc::now(),
        };

        match store.record_exchange(&exchange).await {
            Ok(()) => info!(url = %exchange.url, %session_id, "follow-up answered"),
            Err(e) => warn!(url = %exchange.url, error = %e, "failed to store follow-up"),
        }

        Ok(exchange)
    }

    async fn infer(&self, text: &str, questions: &[String]) -> (InferredAttributes, Vec<QaItem>) {
        let Some(inference) = &self.inference else {
            return (InferredAttributes::default(), Vec::new());
        };

        let attributes = match inference.infer_attributes(text).await {
            Ok(attributes) => attributes,
            Err(e) => {
                warn!(provider = inference.provider(), error = %e, "attribute inference failed");
                InferredAttributes::default()
            }
        };

        let answers = if questions.is_empty() {
            Vec::new()
        } else {
            match inference.answer_questions(text, questions).await {
                Ok(answers) => answers,
                Err(e) => {
                    warn!(provider = inference.provider(), error = %e, "question answering failed");
                    Vec::new()
                }
            }
        };

        (attributes, answers)
    }
}

/// Text a follow-up question is answered from, capped at [`MAX_CONTEXT_CHARS`].
pub fn build_context(
    snapshot: Option<&PageSnapshot>,
    attributes: &InferredAttributes,
    contacts: &ContactRecord,
) -> String {
    let mut lines = Vec::new();

    if let Some(snapshot) = snapshot {
        let page = [
            ("Title", &snapshot.title),
            ("Meta", &snapshot.meta_description),
            ("Main Text", &snapshot.main_text),
        ];
        for (label, value) in page {
            if let Some(value) = value {
                lines.push(format!("{label}: {value}"));
            }
        }
    }

    let inferred = [
        ("Industry", &attributes.industry),
        ("Company Size", &attributes.company_size),
        ("Location", &attributes.location),
        ("Target Audience", &attributes.target_audience),
    ];
    for (label, value) in inferred {
        if let Some(value) = value {
            lines.push(format!("{label}: {value}"));
        }
    }

    if !contacts.emails.is_empty() {
        let emails: Vec<&str> = contacts.emails.iter().map(String::as_str).collect();
        lines.push(format!("Emails: {}", emails.join(", ")));
    }
    if !contacts.phones.is_empty() {
        lines.push(format!("Phones: {}", contacts.phones.join(", ")));
    }
    let socials: Vec<String> = contacts
        .social
        .iter()
        .filter_map(|(platform, url)| url.map(|url| format!("{platform}: {url}")))
        .collect();
    if !socials.is_empty() {
        lines.push(format!("Socials: {}", socials.join(", ")));
    }

    lines.join("\n").chars().take(MAX_CONTEXT_CHARS).collect()
}

fn build_report(
    output: PipelineOutput,
    attributes: InferredAttributes,
    answers: Vec<QaItem>,
) -> AnalysisReport {
    AnalysisReport {
        id: Uuid::new_v4(),
        url: output.target.to_string(),
        final_url: output.final_url().to_string(),
        http_status: output.http_status(),
        analyzed_at: Utc::now(),
        robots_allowed: output.robots_allowed(),
        content: output.content,
        contacts: output.contacts,
        attributes,
        answers,
    }
}
