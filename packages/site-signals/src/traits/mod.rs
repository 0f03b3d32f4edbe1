//! Core trait abstractions.
//!
//! - [`fetcher::Fetcher`] - bounded static retrieval
//! - [`browser::BrowserEngine`] / [`browser::BrowserSession`] - headless rendering
//! - [`inference::Inference`] - language-model collaborator
//! - [`store::AnalysisStore`] - persistence collaborator

pub mod browser;
pub mod fetcher;
pub mod inference;
pub mod store;

pub use browser::{BrowserEngine, BrowserSession, Navigation};
pub use fetcher::Fetcher;
pub use inference::Inference;
pub use store::AnalysisStore;
