use crate::chunking::ChunkingConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_EMBED_DIR: &str = "Embeddings";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Minimum spacing between the starts of two LLM calls.
    pub min_interval: Duration,
    pub analysis_temperature: f32,
    pub chat_temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_COMPLETIONS_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            min_interval: DEFAULT_MIN_INTERVAL,
            analysis_temperature: 0.0,
            chat_temperature: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabInsightConfig {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embedding_dimensions: usize,
    pub embed_dir: PathBuf,
    pub llm: LlmConfig,
}

impl Default for LabInsightConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            embedding_dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
            embed_dir: PathBuf::from(DEFAULT_EMBED_DIR),
            llm: LlmConfig::default(),
        }
    }
}

impl LabInsightConfig {
    /// Lays out indexes under `<data_dir>/Embeddings`.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.embed_dir = data_dir.into().join(DEFAULT_EMBED_DIR);
        self
    }
}
