use crate::error::{CatalogError, GatewayError};
use crate::gateway::ChatRequest;
use crate::models::{DocumentId, DocumentRecord};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// A chat-completion backend. Returns the content of the first choice.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

/// Time source for LLM pacing.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Document metadata owned by the surrounding application. The core only
/// records analysis results and resolves them back at chat time.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    async fn record(&self, record: DocumentRecord) -> Result<(), CatalogError>;

    async fn resolve(&self, document_id: &DocumentId)
        -> Result<Option<DocumentRecord>, CatalogError>;

    /// Returns the removed record, if there was one.
    async fn remove(&self, document_id: &DocumentId)
        -> Result<Option<DocumentRecord>, CatalogError>;
}
