//! Data types shared across the pipeline.

pub mod analysis;
pub mod config;
pub mod contact;
pub mod content;
pub mod page;
pub mod target;

pub use analysis::{
    AnalysisReport, InferredAttributes, QaExchange, QaItem, SessionRef, SessionSummary,
};
pub use config::{FetchLimits, TargetPolicy, DEFAULT_USER_AGENT};
pub use contact::{ContactRecord, SocialLinks, SocialPlatform};
pub use content::ExtractedContent;
pub use page::{FetchResult, FetchSource, PageSnapshot};
pub use target::NormalizedUrl;
