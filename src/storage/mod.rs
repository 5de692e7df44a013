//! Storage contract for processed documents.
//!
//! The agent reads documents through the [`DocumentStore`] trait and never
//! writes to it during a query. Ingestion (saving documents produced by the
//! rasterization step) happens outside the query pipeline.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::AgentError;

pub use memory::MemoryStore;

/// Catalog entry describing one stored document.
///
/// This is what the planner sees when assigning tasks to documents: id,
/// name, and the ingestion-time summary, without page payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Stable document identifier.
    pub id: String,
    /// Human-readable document name.
    pub name: String,
    /// Ingestion-time summary, if one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Number of pages in the document.
    pub page_count: usize,
}

impl DocumentInfo {
    /// Builds a catalog entry from a full document.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            name: document.name.clone(),
            summary: document.summary.clone(),
            page_count: document.page_count(),
        }
    }
}

/// Storage backend for processed documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists all documents as catalog entries.
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, AgentError>;

    /// Retrieves a full document by id, or `None` if it does not exist.
    async fn get_document(&self, id: &str) -> Result<Option<Document>, AgentError>;

    /// Resolves a page's image handle, or `None` when the document or
    /// page does not exist. Providers load the handle when the page is
    /// included in a multimodal call.
    async fn get_page_image(
        &self,
        document_id: &str,
        page_number: u32,
    ) -> Result<Option<String>, AgentError> {
        Ok(self
            .get_document(document_id)
            .await?
            .and_then(|doc| doc.get_page(page_number).map(|p| p.image_path.clone())))
    }

    /// Saves a document, returning its id.
    async fn save_document(&self, document: Document) -> Result<String, AgentError>;

    /// Deletes a document. Returns `true` if it existed.
    async fn delete_document(&self, id: &str) -> Result<bool, AgentError>;
}
