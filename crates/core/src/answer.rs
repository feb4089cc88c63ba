use crate::embeddings::Embedder;
use crate::error::{IndexError, InputError};
use crate::gateway::{ChatMessage, ChatRequest, LlmGateway};
use crate::models::{AnswerKind, ChatAnswer, DocumentId};
use crate::store::{RetrievedChunk, VectorStore};
use crate::traits::DocumentCatalog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_REPORTS_MESSAGE: &str = "No reports uploaded yet. Please upload a lab report first.";
pub const NO_EMBEDDINGS_MESSAGE: &str = "No embeddings found for this report.";
pub const EMBEDDING_FILE_MISSING_MESSAGE: &str =
    "Embedding file missing on server. Please re-upload your report.";
pub const INVALID_INDEX_MESSAGE: &str = "Invalid embedding file format.";

pub const SUGGESTED_QUESTIONS: [&str; 5] = [
    "Summarize my latest lab report in simple words.",
    "Is there anything urgent in my latest lab report?",
    "Explain my latest hemoglobin result.",
    "Are my cholesterol and glucose values okay?",
    "What should I focus on improving based on my latest report?",
];

/// Every outcome comes back as a displayable answer; only an empty question
/// is rejected.
pub struct RagAnswerer {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    catalog: Arc<dyn DocumentCatalog>,
    gateway: LlmGateway,
    model: String,
    top_k: usize,
    temperature: Option<f32>,
}

impl RagAnswerer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        catalog: Arc<dyn DocumentCatalog>,
        gateway: LlmGateway,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            catalog,
            gateway,
            model: model.into(),
            top_k: crate::config::DEFAULT_TOP_K,
            temperature: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn answer(
        &self,
        question: &str,
        document_id: &DocumentId,
    ) -> Result<ChatAnswer, InputError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(InputError::EmptyQuestion);
        }

        let context = match self.retrieve_context(question, document_id).await {
            Ok(chunks) => chunks,
            Err(short_circuit) => {
                info!(
                    document_id = %document_id,
                    kind = ?short_circuit.kind,
                    "chat answered without retrieval"
                );
                return Ok(short_circuit);
            }
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_answer_prompt(question, &context))],
            temperature: self.temperature,
        };

        match self.gateway.complete(&request).await {
            Ok(answer) => Ok(ChatAnswer::new(AnswerKind::Answered, answer)),
            Err(error) => {
                warn!(document_id = %document_id, %error, "chat completion failed");
                Ok(ChatAnswer::new(
                    AnswerKind::GatewayFailed,
                    format!("LLM gateway error: {error}"),
                ))
            }
        }
    }

    /// Resolves the document's index and returns the best chunks, or the
    /// answer to give instead when there is nothing to retrieve from.
    async fn retrieve_context(
        &self,
        question: &str,
        document_id: &DocumentId,
    ) -> Result<Vec<RetrievedChunk>, ChatAnswer> {
        let record = match self.catalog.resolve(document_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(ChatAnswer::new(AnswerKind::NoReports, NO_REPORTS_MESSAGE)),
            Err(error) => {
                return Err(ChatAnswer::new(
                    AnswerKind::IndexLoadFailed,
                    format!("Failed loading embeddings: {error}"),
                ))
            }
        };

        let Some(recorded_path) = record.index_path else {
            return Err(ChatAnswer::new(
                AnswerKind::NoEmbeddings,
                NO_EMBEDDINGS_MESSAGE,
            ));
        };

        let Some(index_path) = self.locate_index(document_id, recorded_path).await else {
            return Err(ChatAnswer::new(
                AnswerKind::EmbeddingFileMissing,
                EMBEDDING_FILE_MISSING_MESSAGE,
            ));
        };

        let index = self
            .store
            .load_from(document_id, &index_path)
            .await
            .map_err(index_failure)?;
        if index.is_empty() {
            return Err(ChatAnswer::new(
                AnswerKind::NoEmbeddings,
                NO_EMBEDDINGS_MESSAGE,
            ));
        }

        let query = self.embedder.embed(question);
        let chunks = index.top_k(&query, self.top_k).map_err(index_failure)?;
        debug!(
            document_id = %document_id,
            retrieved = chunks.len(),
            best_score = chunks.first().map(|chunk| chunk.score),
            "context retrieved"
        );
        Ok(chunks)
    }

    /// The recorded path, or the store's own location for the document when
    /// the recorded one does not resolve from here (e.g. a relative path
    /// written under another working directory).
    async fn locate_index(&self, document_id: &DocumentId, recorded: PathBuf) -> Option<PathBuf> {
        if exists(&recorded).await {
            return Some(recorded);
        }

        let fallback = self.store.index_path(document_id);
        if fallback != recorded && exists(&fallback).await {
            debug!(
                document_id = %document_id,
                recorded = %recorded.display(),
                found = %fallback.display(),
                "recorded index path did not resolve, using store location"
            );
            return Some(fallback);
        }
        None
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn index_failure(error: IndexError) -> ChatAnswer {
    match error {
        IndexError::Corrupt { .. } | IndexError::DimensionMismatch { .. } => {
            warn!(%error, "stored index unusable");
            ChatAnswer::new(AnswerKind::InvalidIndex, INVALID_INDEX_MESSAGE)
        }
        IndexError::NotFound { .. } => ChatAnswer::new(
            AnswerKind::EmbeddingFileMissing,
            EMBEDDING_FILE_MISSING_MESSAGE,
        ),
        other => ChatAnswer::new(
            AnswerKind::IndexLoadFailed,
            format!("Failed loading embeddings: {other}"),
        ),
    }
}

/// Chunks arrive best-first and are kept in that order.
pub fn build_answer_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use ONLY the medical report info below to answer:\n\n\
         {context}\n\n\
         Question: {question}\n\n\
         Give a clear, simple explanation suitable for a patient."
    )
}
