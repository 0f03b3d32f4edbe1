use serde::{Deserialize, Serialize};

/// Title, description and main text of a page.
///
/// Every field is independently optional; absence is an expected outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub main_text: Option<String>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.meta_description.is_none() && self.main_text.is_none()
    }
}
