//! Document and page models.
//!
//! Documents are produced by an external ingestion step (PDF or image
//! rasterization) and are read-only to the agent: the pipeline holds
//! references for the duration of a query and never mutates them.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// A single rasterized document page.
///
/// The `image_path` is an opaque handle that providers resolve when the
/// page is included in a multimodal call (read, base64-encode, inline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number, unique within its document.
    pub page_number: u32,
    /// Path to the rendered page image.
    pub image_path: String,
    /// Optional short description of the page content, produced at ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Page {
    /// Creates a page with no summary.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] when `page_number` is zero or
    /// `image_path` is empty.
    pub fn new(page_number: u32, image_path: impl Into<String>) -> Result<Self, AgentError> {
        let image_path = image_path.into();
        if page_number == 0 {
            return Err(AgentError::Validation {
                message: "page number must be positive".to_string(),
            });
        }
        if image_path.trim().is_empty() {
            return Err(AgentError::Validation {
                message: "page image path is required".to_string(),
            });
        }
        Ok(Self {
            page_number,
            image_path,
            summary: None,
        })
    }

    /// Attaches a summary to the page.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// A processed document with its ordered pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, unique within storage.
    pub id: String,
    /// Human-readable document name.
    pub name: String,
    /// Pages in reading order, numbered 1..N.
    pub pages: Vec<Page>,
    /// Optional document-level summary shown to the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Document {
    /// Creates a document with the given pages.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pages,
            summary: None,
        }
    }

    /// Attaches a document-level summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Number of pages in the document.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Looks up a page by its 1-based page number.
    #[must_use]
    pub fn get_page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_number: u32, image_path: &str) -> Page {
        Page::new(page_number, image_path).unwrap_or_else(|_| unreachable!())
    }

    fn sample_document() -> Document {
        Document::new(
            "d1",
            "Q3 Report",
            vec![
                page(1, "/tmp/d1/p1.jpg"),
                page(2, "/tmp/d1/p2.jpg").with_summary("Revenue table"),
                page(3, "/tmp/d1/p3.jpg"),
            ],
        )
        .with_summary("Q3 financials")
    }

    #[test]
    fn test_page_count() {
        assert_eq!(sample_document().page_count(), 3);
    }

    #[test]
    fn test_get_page_by_number() {
        let doc = sample_document();
        let page = doc.get_page(2);
        assert_eq!(page.map(|p| p.page_number), Some(2));
        assert_eq!(
            page.and_then(|p| p.summary.as_deref()),
            Some("Revenue table")
        );
        assert!(doc.get_page(9).is_none());
    }

    #[test]
    fn test_page_rejects_zero_page_number() {
        let result = Page::new(0, "/tmp/p0.jpg");
        assert!(matches!(result, Err(AgentError::Validation { .. })));
    }

    #[test]
    fn test_page_rejects_empty_image_path() {
        assert!(matches!(
            Page::new(1, ""),
            Err(AgentError::Validation { .. })
        ));
        assert!(matches!(
            Page::new(1, "   "),
            Err(AgentError::Validation { .. })
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let doc = sample_document();
        let json = serde_json::to_string(&doc).unwrap_or_default();
        let back: Document = serde_json::from_str(&json).unwrap_or_else(|_| unreachable!());
        assert_eq!(back, doc);
    }

    #[test]
    fn test_summary_omitted_when_absent() {
        let json = serde_json::to_string(&page(1, "p1.jpg")).unwrap_or_default();
        assert!(!json.contains("summary"));
    }
}
