//! RecordFlow Ingestion CLI
//!
//! Operator tooling for the analysis pipeline:
//! - `reprocess <id>` re-runs extraction and analysis for one document
//! - `extract <file> <media-type>` prints the text the extractor sees

use anyhow::Context;
use clap::{Parser, Subcommand};
use recordflow_common::{
    analysis::{create_llm_client, AnalysisProvider},
    config::AppConfig,
    db::{DbPool, Repository},
    storage::FileStore,
    VERSION,
};
use recordflow_ingestion::{IngestionOrchestrator, TextExtractor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ingestion", version = VERSION, about = "RecordFlow ingestion pipeline tools")]
struct Cli {
    /// Configuration file (defaults to layered config/ files and APP__ env)
    #[arg(long, env = "RECORDFLOW_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-run the analysis pipeline for a stored document
    Reprocess {
        document_id: Uuid,
    },
    /// Extract text from a local file and print it
    Extract {
        file: PathBuf,
        media_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("RecordFlow ingestion v{}", VERSION);

    match cli.command {
        Command::Extract { file, media_type } => {
            let root = file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let extractor = TextExtractor::from_config(&config.ingestion, FileStore::new(root));
            let extraction = extractor
                .extract_path(&file, &media_type)
                .await
                .with_context(|| format!("extraction failed for {}", file.display()))?;

            info!(method = extraction.method.as_str(), "Extraction complete");
            println!("{}", extraction.text);
        }
        Command::Reprocess { document_id } => {
            let pool = DbPool::new(&config.database).await?;
            let repository = Arc::new(Repository::new(pool));

            let extractor = Arc::new(TextExtractor::from_config(
                &config.ingestion,
                FileStore::new(&config.storage.root),
            ));
            let analysis = Arc::new(AnalysisProvider::new(
                create_llm_client(&config.analysis),
                &config.analysis,
            ));
            let orchestrator = IngestionOrchestrator::new(
                repository.clone(),
                repository,
                extractor,
                analysis,
                &config.ingestion,
            );

            let state = orchestrator
                .run(document_id)
                .await
                .with_context(|| format!("reprocessing {} failed", document_id))?;
            println!("{} {}", document_id, state);
        }
    }

    Ok(())
}
