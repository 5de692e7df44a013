//! # docpixie
//!
//! Vision-first document question answering with an adaptive agent loop.
//!
//! Instead of text embeddings and vector indices, docpixie shows actual
//! page images to a multimodal model: the model that answers the question
//! also selects the relevant pages. Around that substrate runs an adaptive
//! agent that decomposes a query into focused per-document tasks and
//! revises its plan as findings arrive.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docpixie::agent::{PixieAgent, PixieConfig, create_provider};
//! use docpixie::document::{Document, Page};
//! use docpixie::storage::{DocumentStore, MemoryStore};
//!
//! # async fn run() -> Result<(), docpixie::error::AgentError> {
//! let config = PixieConfig::from_env()?;
//! let provider = create_provider(&config)?;
//!
//! let storage = Arc::new(MemoryStore::new());
//! storage
//!     .save_document(
//!         Document::new(
//!             "q3",
//!             "Q3 Report",
//!             vec![Page::new(1, "pages/q3/p1.jpg")?],
//!         )
//!         .with_summary("Q3 financials"),
//!     )
//!     .await?;
//!
//! let agent = PixieAgent::new(provider, storage, config);
//! let result = agent.process_query("What were Q3 revenues?", &[]).await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod document;
pub mod error;
pub mod storage;

pub use agent::{PixieAgent, PixieConfig, Provider, QueryResult, create_provider};
pub use document::{Document, Page};
pub use error::AgentError;
pub use storage::{DocumentInfo, DocumentStore, MemoryStore};
