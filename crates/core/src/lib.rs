pub mod answer;
pub mod catalog;
pub mod chat_client;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod store;
pub mod structured;
pub mod traits;

pub use answer::{RagAnswerer, SUGGESTED_QUESTIONS};
pub use catalog::{InMemoryCatalog, JsonFileCatalog};
pub use chat_client::OpenAiCompatibleClient;
pub use chunking::{chunk_texts, normalize_page_text, split_text, ChunkingConfig, TextChunk};
pub use config::{LabInsightConfig, LlmConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AnalysisError, CatalogError, GatewayError, IndexError, IngestError, InputError};
pub use extractor::{extract_page_texts, join_pages, LopdfExtractor, PageText, PdfExtractor};
pub use gateway::{ChatMessage, ChatRequest, LlmGateway, RateLimiter, SystemClock};
pub use ingest::{derive_document_id, discover_pdf_files, FolderReport, SkippedPdf};
pub use models::{
    AnalysisReport, AnswerKind, ChatAnswer, DocumentId, DocumentRecord, Severity, Summary,
    TestResult, TestStatus,
};
pub use orchestrator::{LabInsight, ReportAnalyzer};
pub use retrieval::{top_k, ScoredPosition};
pub use store::{RetrievedChunk, StoredIndex, VectorStore};
pub use structured::{
    into_summary_and_tests, parse_llm_response, CompletenessReport, Extraction, ExtractionOutcome,
    StructuredExtractor,
};
pub use traits::{ChatModel, Clock, DocumentCatalog};
