use std::path::PathBuf;
use thiserror::Error;

/// Request-contract violations. These are the only failures that reach the
/// caller as rejected requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("not a pdf file: {0}")]
    NotPdf(PathBuf),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("document identifier is empty")]
    EmptyIdentifier,

    #[error("invalid document identifier: {0}")]
    InvalidIdentifier(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no vector index stored for document {document_id}")]
    NotFound { document_id: String },

    #[error("vector index for {document_id} is corrupt: {details}")]
    Corrupt { document_id: String, details: String },

    #[error("query vector has {actual} dimensions, index has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("llm endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed llm response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the analysis write path. LLM problems never appear here; they
/// are folded into the extraction outcome instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("pdf contains no extractable text: {0}")]
    EmptyDocument(PathBuf),

    #[error("no pdf files found in {0}")]
    NoPdfFiles(PathBuf),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
