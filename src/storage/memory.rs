//! In-memory document store.
//!
//! Holds documents in a map guarded by an async lock. Suitable for tests
//! and short-lived embedding scenarios; nothing is persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentInfo, DocumentStore};
use crate::document::Document;
use crate::error::AgentError;

/// Map-backed [`DocumentStore`] with no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given documents.
    #[must_use]
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let map = documents.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            documents: RwLock::new(map),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, AgentError> {
        let guard = self.documents.read().await;
        let mut infos: Vec<DocumentInfo> = guard.values().map(DocumentInfo::from_document).collect();
        // Stable catalog order regardless of map iteration order.
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, AgentError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn save_document(&self, document: Document) -> Result<String, AgentError> {
        let id = document.id.clone();
        self.documents.write().await.insert(id.clone(), document);
        Ok(id)
    }

    async fn delete_document(&self, id: &str) -> Result<bool, AgentError> {
        Ok(self.documents.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;

    fn doc(id: &str, pages: usize) -> Document {
        let pages = (1..=pages)
            .map(|n| {
                Page::new(u32::try_from(n).unwrap_or(1), format!("/tmp/{id}/p{n}.jpg"))
                    .unwrap_or_else(|_| unreachable!())
            })
            .collect();
        Document::new(id, format!("Document {id}"), pages)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryStore::new();
        let id = store
            .save_document(doc("d1", 3))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(id, "d1");

        let loaded = store
            .get_document("d1")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(loaded.map(|d| d.page_count()), Some(3));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryStore::new();
        let loaded = store
            .get_document("nope")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_list_documents_sorted() {
        let store = MemoryStore::with_documents(vec![doc("d2", 1), doc("d1", 2)]);
        let infos = store
            .list_documents()
            .await
            .unwrap_or_else(|_| unreachable!());
        let ids: Vec<&str> = infos.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert_eq!(infos[0].page_count, 2);
    }

    #[tokio::test]
    async fn test_get_page_image() {
        let store = MemoryStore::with_documents(vec![doc("d1", 2)]);
        let handle = store
            .get_page_image("d1", 2)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(handle.as_deref(), Some("/tmp/d1/p2.jpg"));

        let missing_page = store
            .get_page_image("d1", 9)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(missing_page.is_none());

        let missing_doc = store
            .get_page_image("d9", 1)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(missing_doc.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::with_documents(vec![doc("d1", 1)]);
        assert!(
            store
                .delete_document("d1")
                .await
                .unwrap_or_else(|_| unreachable!())
        );
        assert!(
            !store
                .delete_document("d1")
                .await
                .unwrap_or_else(|_| unreachable!())
        );
    }
}
