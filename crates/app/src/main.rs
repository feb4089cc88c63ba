use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use labinsight_core::{
    DocumentCatalog, DocumentId, JsonFileCatalog, LabInsight, LabInsightConfig,
    OpenAiCompatibleClient, SUGGESTED_QUESTIONS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CATALOG_FILE: &str = "catalog.json";

#[derive(Parser)]
#[command(name = "labinsight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the catalog and the Embeddings/ index directory
    #[arg(long, env = "LABINSIGHT_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// OpenAI-compatible chat completions URL
    #[arg(
        long,
        env = "LABINSIGHT_LLM_ENDPOINT",
        default_value = labinsight_core::config::DEFAULT_CHAT_COMPLETIONS_URL
    )]
    llm_endpoint: String,

    /// Model name sent with every completion request
    #[arg(
        long,
        env = "LABINSIGHT_LLM_MODEL",
        default_value = labinsight_core::config::DEFAULT_MODEL
    )]
    llm_model: String,

    /// Bearer token for the LLM endpoint
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Minimum seconds between the starts of two LLM calls
    #[arg(long, env = "LABINSIGHT_MIN_INTERVAL_SECS", default_value_t = 3.0)]
    min_interval_secs: f64,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse one lab-report PDF: index it and extract a structured summary.
    Analyze {
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Analyse every PDF below a folder, skipping files that fail.
    AnalyzeFolder {
        #[arg(long)]
        folder: PathBuf,
    },
    /// Ask a question about an analysed report.
    Ask {
        #[arg(long)]
        document: String,
        #[arg(long)]
        question: String,
    },
    /// Print the stored analysis of a report.
    Show {
        #[arg(long)]
        document: String,
    },
    /// List every analysed report.
    List,
    /// Remove a report's index and catalog entry.
    Delete {
        #[arg(long)]
        document: String,
    },
    /// Print starter questions for the chat.
    Suggest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir.display(),
        "labinsight boot"
    );

    let mut config = LabInsightConfig::default().with_data_dir(&cli.data_dir);
    config.llm.endpoint = cli.llm_endpoint;
    config.llm.model = cli.llm_model;
    config.llm.api_key = cli.api_key;
    config.llm.min_interval = Duration::try_from_secs_f64(cli.min_interval_secs)
        .context("--min-interval-secs must be a non-negative number")?;

    let catalog = Arc::new(JsonFileCatalog::new(cli.data_dir.join(CATALOG_FILE)));

    match cli.command {
        Command::Suggest => {
            for question in SUGGESTED_QUESTIONS {
                println!("{question}");
            }
        }
        Command::Show { document } => {
            let id = DocumentId::new(document)?;
            let record = catalog
                .resolve(&id)
                .await?
                .with_context(|| format!("no analysed report with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::List => {
            let records = catalog.list().await?;
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.document_id,
                    record.analyzed_at.to_rfc3339(),
                    record.source_path
                );
            }
        }
        command => {
            if config.llm.api_key.is_none() {
                warn!("no api key configured, the llm endpoint may reject requests");
            }
            let client =
                OpenAiCompatibleClient::new(&config.llm.endpoint, config.llm.api_key.clone())
                    .with_context(|| format!("invalid llm endpoint {}", config.llm.endpoint))?;
            let insight = LabInsight::new(&config, Arc::new(client), catalog.clone())?;

            run_pipeline_command(&insight, command).await?;
        }
    }

    Ok(())
}

async fn run_pipeline_command(insight: &LabInsight, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Analyze { pdf } => {
            let report = insight
                .analyzer
                .analyze(&pdf)
                .await
                .with_context(|| format!("analysis of {} failed", pdf.display()))?;
            if !report.missing_required_tests.is_empty() {
                warn!(missing = ?report.missing_required_tests, "required tests not extracted");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::AnalyzeFolder { folder } => {
            let report = insight.analyzer.analyze_folder(&folder).await?;
            for analyzed in &report.analyzed {
                println!(
                    "analysed {} severity={:?} tests={}",
                    analyzed.document_id,
                    analyzed.summary.severity,
                    analyzed.test_results.len()
                );
            }
            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            println!(
                "{} analysed, {} skipped",
                report.analyzed.len(),
                report.skipped_files.len()
            );
        }
        Command::Ask { document, question } => {
            let id = DocumentId::new(document)?;
            let answer = insight.answerer.answer(&question, &id).await?;
            if !answer.is_answered() {
                warn!(kind = ?answer.kind, "question answered without the llm");
            }
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Delete { document } => {
            let id = DocumentId::new(document)?;
            if insight.analyzer.delete(&id).await? {
                println!("deleted {id}");
            } else {
                println!("nothing stored for {id}");
            }
        }
        Command::Suggest | Command::Show { .. } | Command::List => {}
    }

    Ok(())
}
