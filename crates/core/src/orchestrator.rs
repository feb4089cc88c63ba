use crate::answer::RagAnswerer;
use crate::chunking::{chunk_texts, ChunkingConfig};
use crate::config::LabInsightConfig;
use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{AnalysisError, IngestError, InputError, Result};
use crate::extractor::{join_pages, LopdfExtractor, PdfExtractor};
use crate::gateway::{LlmGateway, RateLimiter};
use crate::ingest::{
    derive_document_id, discover_pdf_files, validate_pdf_path, FolderReport, SkippedPdf,
};
use crate::models::{AnalysisReport, DocumentId, DocumentRecord};
use crate::store::VectorStore;
use crate::structured::{ExtractionOutcome, StructuredExtractor};
use crate::traits::{ChatModel, DocumentCatalog};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The write path: PDF in, index and structured summary out.
pub struct ReportAnalyzer {
    extractor: Arc<dyn PdfExtractor>,
    chunking: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    structured: StructuredExtractor,
    catalog: Arc<dyn DocumentCatalog>,
}

impl ReportAnalyzer {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        chunking: ChunkingConfig,
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        structured: StructuredExtractor,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> std::result::Result<Self, IngestError> {
        chunking.validate()?;
        Ok(Self {
            extractor,
            chunking,
            embedder,
            store,
            structured,
            catalog,
        })
    }

    pub async fn analyze(&self, path: &Path) -> Result<AnalysisReport> {
        validate_pdf_path(path)?;

        let extractor = Arc::clone(&self.extractor);
        let source = path.to_path_buf();
        let (document_id, pages) = tokio::task::spawn_blocking(move || {
            let document_id = derive_document_id(&source)?;
            let pages = extractor.extract_pages(&source)?;
            Ok::<_, AnalysisError>((document_id, pages))
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))??;

        let full_text = join_pages(&pages);
        if full_text.is_empty() {
            return Err(AnalysisError::EmptyDocument(path.to_path_buf()));
        }

        let chunks = chunk_texts(&full_text, self.chunking);
        let chunk_count = chunks.len();
        let vectors = self.embedder.embed_batch(&chunks);
        let index_path = self.store.save(&document_id, chunks, vectors).await?;

        let extraction = self.structured.extract(&full_text).await;
        match &extraction.outcome {
            ExtractionOutcome::Parsed => {}
            ExtractionOutcome::Degraded => {
                warn!(document_id = %document_id, "analysis kept the raw llm reply")
            }
            ExtractionOutcome::GatewayFailed(error) => {
                warn!(document_id = %document_id, %error, "analysis finished without llm summary")
            }
        }

        let recorded = self
            .catalog
            .record(DocumentRecord {
                document_id: document_id.clone(),
                source_path: path.display().to_string(),
                index_path: Some(index_path.clone()),
                summary: extraction.summary.clone(),
                test_results: extraction.tests.clone(),
                analyzed_at: Utc::now(),
            })
            .await;
        if let Err(error) = recorded {
            // Without its record the index is unreachable.
            if let Err(cleanup) = self.store.delete(&document_id).await {
                warn!(
                    document_id = %document_id,
                    error = %cleanup,
                    "could not remove orphaned index"
                );
            }
            return Err(error.into());
        }

        info!(
            document_id = %document_id,
            pages = pages.len(),
            chunks = chunk_count,
            tests = extraction.tests.len(),
            "report analysed"
        );

        Ok(AnalysisReport {
            document_id,
            summary: extraction.summary,
            test_results: extraction.tests,
            index_path,
            chunk_count,
            missing_required_tests: extraction.completeness.missing,
        })
    }

    /// Analyses every PDF under `folder`. Files that fail are listed with the
    /// reason instead of aborting the run.
    pub async fn analyze_folder(&self, folder: &Path) -> Result<FolderReport> {
        if !folder.is_dir() {
            return Err(InputError::MissingFile(folder.to_path_buf()).into());
        }

        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(AnalysisError::NoPdfFiles(folder.to_path_buf()));
        }

        let mut analyzed = Vec::new();
        let mut skipped_files = Vec::new();
        for path in files {
            match self.analyze(&path).await {
                Ok(report) => analyzed.push(report),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping pdf");
                    skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(FolderReport {
            analyzed,
            skipped_files,
        })
    }

    /// Drops the stored index and the catalog record. Returns whether
    /// anything existed.
    pub async fn delete(&self, document_id: &DocumentId) -> Result<bool> {
        let index_removed = self.store.delete(document_id).await?;
        let record = self.catalog.remove(document_id).await?;

        if let Some(recorded_path) = record.as_ref().and_then(|r| r.index_path.as_ref()) {
            if *recorded_path != self.store.index_path(document_id) {
                match tokio::fs::remove_file(recorded_path).await {
                    Ok(()) => {}
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                    Err(error) => return Err(crate::error::IndexError::Io(error).into()),
                }
            }
        }

        info!(document_id = %document_id, index_removed, "document deleted");
        Ok(index_removed || record.is_some())
    }
}

/// The analyser and the answerer wired to one embedder and one rate limiter.
pub struct LabInsight {
    pub analyzer: ReportAnalyzer,
    pub answerer: RagAnswerer,
}

impl LabInsight {
    pub fn new(
        config: &LabInsightConfig,
        model: Arc<dyn ChatModel>,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> std::result::Result<Self, IngestError> {
        let limiter = Arc::new(RateLimiter::new(config.llm.min_interval));
        Self::from_parts(config, Arc::new(LopdfExtractor), model, limiter, catalog)
    }

    pub fn from_parts(
        config: &LabInsightConfig,
        extractor: Arc<dyn PdfExtractor>,
        model: Arc<dyn ChatModel>,
        limiter: Arc<RateLimiter>,
        catalog: Arc<dyn DocumentCatalog>,
    ) -> std::result::Result<Self, IngestError> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(CharacterNgramEmbedder::new(config.embedding_dimensions));
        let store = VectorStore::new(&config.embed_dir);
        let gateway = LlmGateway::new(model, limiter);

        let structured = StructuredExtractor::new(gateway.clone(), &config.llm.model)
            .with_temperature(config.llm.analysis_temperature);
        let analyzer = ReportAnalyzer::new(
            extractor,
            config.chunking,
            Arc::clone(&embedder),
            store.clone(),
            structured,
            Arc::clone(&catalog),
        )?;

        let answerer = RagAnswerer::new(embedder, store, catalog, gateway, &config.llm.model)
            .with_top_k(config.top_k)
            .with_temperature(config.llm.chat_temperature);

        Ok(Self { analyzer, answerer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::error::{CatalogError, GatewayError};
    use crate::extractor::PageText;
    use crate::gateway::testing::{ManualClock, ScriptedModel};
    use crate::models::{Severity, TestStatus};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const REPLY: &str = r#"```json
{
  "summary": "Hemoglobin is within range.",
  "key_findings": ["Hemoglobin normal"],
  "recommendations": [],
  "severity": "low",
  "tests": [
    {"name": "Hemoglobin", "value": "13.5", "unit": "g/dL", "normal_range": "12.0-15.5", "status": "normal", "interpretation": "Normal"}
  ]
}
```"#;

    struct FixedText(&'static str);

    impl PdfExtractor for FixedText {
        fn extract_pages(&self, _path: &Path) -> std::result::Result<Vec<PageText>, IngestError> {
            if self.0.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![PageText {
                number: 1,
                text: self.0.to_string(),
            }])
        }
    }

    struct FullDisk;

    #[async_trait::async_trait]
    impl DocumentCatalog for FullDisk {
        async fn record(&self, _record: DocumentRecord) -> std::result::Result<(), CatalogError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        async fn resolve(
            &self,
            _document_id: &DocumentId,
        ) -> std::result::Result<Option<DocumentRecord>, CatalogError> {
            Ok(None)
        }

        async fn remove(
            &self,
            _document_id: &DocumentId,
        ) -> std::result::Result<Option<DocumentRecord>, CatalogError> {
            Ok(None)
        }
    }

    struct Harness {
        dir: TempDir,
        model: Arc<ScriptedModel>,
        catalog: Arc<InMemoryCatalog>,
        clock: Arc<ManualClock>,
        insight: LabInsight,
    }

    fn harness(
        text: &'static str,
        replies: Vec<std::result::Result<String, GatewayError>>,
    ) -> Harness {
        let dir = tempdir().expect("tempdir");
        let config = LabInsightConfig::default().with_data_dir(dir.path());
        let model = Arc::new(ScriptedModel::new(replies));
        let catalog = Arc::new(InMemoryCatalog::new());
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(config.llm.min_interval, clock.clone()));
        let insight = LabInsight::from_parts(
            &config,
            Arc::new(FixedText(text)),
            model.clone(),
            limiter,
            catalog.clone(),
        )
        .expect("valid config");
        Harness {
            dir,
            model,
            catalog,
            clock,
            insight,
        }
    }

    fn write_pdf(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).expect("write pdf");
        path
    }

    #[tokio::test]
    async fn analysis_indexes_summarises_and_records() {
        let harness = harness(
            "Hemoglobin: 13.5 g/dL (12.0–15.5)",
            vec![Ok(REPLY.to_string())],
        );
        let pdf = write_pdf(&harness.dir, "apc.pdf", b"%PDF-1.4 apc");

        let report = harness.insight.analyzer.analyze(&pdf).await.expect("analysis");

        assert!(report.document_id.as_str().starts_with("apc-"));
        assert_eq!(report.chunk_count, 1);
        assert!(report.index_path.exists());
        assert_eq!(report.summary.severity, Severity::Low);
        assert_eq!(report.test_results.len(), 1);
        assert_eq!(report.test_results[0].status, TestStatus::Normal);
        assert!(report.missing_required_tests.contains(&"TSH".to_string()));
        assert!(!report.missing_required_tests.contains(&"Hemoglobin".to_string()));

        let record = harness
            .catalog
            .resolve(&report.document_id)
            .await
            .expect("catalog")
            .expect("record stored");
        assert_eq!(record.index_path.as_deref(), Some(report.index_path.as_path()));
        assert_eq!(record.test_results, report.test_results);

        let request = &harness.model.recorded()[0];
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.messages[0].content.contains("Hemoglobin: 13.5 g/dL"));
    }

    #[tokio::test]
    async fn gateway_failure_still_produces_an_analysis() {
        let harness = harness(
            "Glucose 92 mg/dL",
            vec![Err(GatewayError::MalformedResponse("boom".to_string()))],
        );
        let pdf = write_pdf(&harness.dir, "cbc.pdf", b"%PDF-1.4 cbc");

        let report = harness.insight.analyzer.analyze(&pdf).await.expect("analysis");
        assert!(report.summary.overall.starts_with("AI analysis unavailable"));
        assert!(report.test_results.is_empty());
        assert!(report.index_path.exists());
    }

    #[tokio::test]
    async fn input_errors_are_rejected_before_any_work() {
        let harness = harness("text", Vec::new());
        let missing = harness.dir.path().join("missing.pdf");

        let result = harness.insight.analyzer.analyze(&missing).await;
        assert!(matches!(
            result,
            Err(AnalysisError::Input(InputError::MissingFile(_)))
        ));

        let not_pdf = write_pdf(&harness.dir, "report.txt", b"text");
        let result = harness.insight.analyzer.analyze(&not_pdf).await;
        assert!(matches!(result, Err(AnalysisError::Input(InputError::NotPdf(_)))));
        assert!(harness.model.recorded().is_empty());
    }

    #[tokio::test]
    async fn document_without_text_is_an_error() {
        let harness = harness("", Vec::new());
        let pdf = write_pdf(&harness.dir, "scan.pdf", b"%PDF-1.4 image only");

        let result = harness.insight.analyzer.analyze(&pdf).await;
        assert!(matches!(result, Err(AnalysisError::EmptyDocument(_))));
    }

    #[tokio::test]
    async fn analysis_and_chat_share_one_pacing_window() {
        let harness = harness(
            "Hemoglobin: 13.5 g/dL (12.0–15.5)",
            vec![Ok(REPLY.to_string()), Ok("All good.".to_string())],
        );
        let pdf = write_pdf(&harness.dir, "apc.pdf", b"%PDF-1.4 apc");

        let report = harness.insight.analyzer.analyze(&pdf).await.expect("analysis");
        let answer = harness
            .insight
            .answerer
            .answer("Explain my hemoglobin result.", &report.document_id)
            .await
            .expect("answer");

        assert!(answer.is_answered());
        assert_eq!(harness.clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn delete_removes_index_and_record() {
        let harness = harness("Hemoglobin 13.5", vec![Ok(REPLY.to_string())]);
        let pdf = write_pdf(&harness.dir, "apc.pdf", b"%PDF-1.4 apc");
        let report = harness.insight.analyzer.analyze(&pdf).await.expect("analysis");

        assert!(harness.insight.analyzer.delete(&report.document_id).await.expect("delete"));
        assert!(!report.index_path.exists());
        assert!(harness
            .catalog
            .resolve(&report.document_id)
            .await
            .expect("catalog")
            .is_none());
        assert!(!harness.insight.analyzer.delete(&report.document_id).await.expect("delete"));
    }

    #[tokio::test]
    async fn folder_analysis_covers_nested_pdfs() {
        let harness = harness(
            "Hemoglobin 13.5",
            vec![Ok(REPLY.to_string()), Ok(REPLY.to_string())],
        );
        let folder = harness.dir.path().join("uploads");
        std::fs::create_dir_all(folder.join("nested")).expect("folders");
        std::fs::write(folder.join("a.pdf"), b"%PDF-1.4 a").expect("a");
        std::fs::write(folder.join("nested").join("b.pdf"), b"%PDF-1.4 b").expect("b");

        let report = harness
            .insight
            .analyzer
            .analyze_folder(&folder)
            .await
            .expect("folder report");
        assert_eq!(report.analyzed.len(), 2);
        assert!(report.skipped_files.is_empty());

        let empty = harness.dir.path().join("empty");
        std::fs::create_dir_all(&empty).expect("empty folder");
        assert!(matches!(
            harness.insight.analyzer.analyze_folder(&empty).await,
            Err(AnalysisError::NoPdfFiles(_))
        ));
    }

    #[tokio::test]
    async fn failed_catalog_write_leaves_no_index_behind() {
        let dir = tempdir().expect("tempdir");
        let config = LabInsightConfig::default().with_data_dir(dir.path());
        let limiter = Arc::new(RateLimiter::with_clock(
            config.llm.min_interval,
            Arc::new(ManualClock::new()),
        ));
        let insight = LabInsight::from_parts(
            &config,
            Arc::new(FixedText("Hemoglobin 13.5")),
            Arc::new(ScriptedModel::new(vec![Ok(REPLY.to_string())])),
            limiter,
            Arc::new(FullDisk),
        )
        .expect("valid config");
        let pdf = write_pdf(&dir, "apc.pdf", b"%PDF-1.4 apc");

        let result = insight.analyzer.analyze(&pdf).await;
        assert!(matches!(result, Err(AnalysisError::Catalog(_))));

        let leftovers: Vec<_> = std::fs::read_dir(&config.embed_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .collect()
            })
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "orphaned files: {leftovers:?}");
    }
}
