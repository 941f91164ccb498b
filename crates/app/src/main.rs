use chrono::Utc;
use clap::{Parser, Subcommand};
use notes_assistant_core::{
    ChapterMap, ChatSession, ConversationOrchestrator, DirectoryWatcher, IngestionOptions,
    IngestionPipeline, OllamaClient, QdrantStore, RetrievalIndex, StatusBroadcaster, StatusMode,
    StatusState, ToolDispatcher, ToolRegistry, WatcherConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "notes-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = "notes_chunks")]
    collection: String,

    /// Ollama base URL
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Chat model served by Ollama
    #[arg(long, default_value = "mistral")]
    model: String,

    /// Folder that holds the notes
    #[arg(long, env = "NOTES_DIR", default_value = "./notes")]
    notes_dir: PathBuf,

    /// Path of the persisted chapter map
    #[arg(long, env = "NOTES_CHAPTER_MAP", default_value = "./data/chapter_map.json")]
    chapter_map: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a single file into the index.
    Ingest {
        /// File to ingest.
        #[arg(long)]
        file: PathBuf,
    },
    /// Scan the notes folder and ingest whatever the index is missing.
    Sync,
    /// Watch the notes folder and ingest files as they change.
    Watch,
    /// Similarity-search the indexed notes.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// List the filenames known to the index.
    List,
    /// Ask the assistant a question grounded in the notes.
    Ask {
        /// The question to ask.
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "notes-assistant boot"
    );

    let index = Arc::new(QdrantStore::new(&cli.qdrant_url, &cli.collection));
    index
        .ensure_collection()
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let status = StatusBroadcaster::new();
    let pipeline = Arc::new(
        IngestionPipeline::new(
            IngestionOptions::default(),
            ChapterMap::new(cli.chapter_map.clone()),
            status.clone(),
        )
        .map_err(|error| anyhow::anyhow!(error.to_string()))?,
    );

    match cli.command {
        Command::Ingest { file } => {
            let outcome = pipeline
                .ingest_file(&file, index.as_ref())
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if outcome.chunk_count == 0 {
                println!("no text found in {}", outcome.filename);
            } else {
                println!(
                    "{} chunks from {} ingested at {}",
                    outcome.chunk_count,
                    outcome.filename,
                    outcome.ingested_at.to_rfc3339()
                );
                println!("chapter keys: {}", outcome.chapter_keys.join(", "));
            }
        }
        Command::Sync => {
            let report = pipeline
                .sync_folder(&cli.notes_dir, index.as_ref())
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    cli.notes_dir.display()
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
                }
            }

            println!(
                "{} files ingested, {} remapped, {} skipped at {}",
                report.ingested.len(),
                report.remapped_files,
                report.skipped_files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Watch => {
            tokio::spawn(log_status_events(status.subscribe()));

            let watcher = DirectoryWatcher::new(cli.notes_dir, WatcherConfig::default());
            info!(folder = %watcher.folder().display(), "watching notes folder");

            watcher
                .run(pipeline.as_ref(), index.as_ref())
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        }
        Command::Search { query, top_k } => {
            let hits = index
                .query(&query, top_k)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no matching chunks");
            }

            for hit in hits {
                println!(
                    "score={:.4} file={} page={}",
                    hit.score, hit.metadata.filename, hit.metadata.page
                );
                println!("  chunk_text:\n{}", hit.text);
            }
        }
        Command::List => {
            let files = index
                .list_filenames()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if files.is_empty() {
                println!("no notes indexed");
            }
            for file in files {
                println!("{file}");
            }
        }
        Command::Ask { message } => {
            tokio::spawn(log_status_events(status.subscribe()));

            let chat_model = OllamaClient::new(&cli.ollama_url, cli.model.clone())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let knowledge_client = OllamaClient::new(&cli.ollama_url, cli.model.clone())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let mut registry = ToolRegistry::new();
            registry.enable_chapter_fetch();
            registry.enable_manual_ingestion();

            let knowledge = if knowledge_client.health_check().await {
                registry.enable_knowledge_fallback();
                Some(Arc::new(knowledge_client))
            } else {
                warn!(url = %cli.ollama_url, "ollama unreachable; teach_topic stays disabled");
                None
            };

            let dispatcher = ToolDispatcher::new(Arc::clone(&index), Arc::clone(&pipeline), knowledge);
            let orchestrator =
                ConversationOrchestrator::new(chat_model, registry, dispatcher, status.clone());

            info!(
                model = %cli.model,
                tools = orchestrator.registry().definitions().len(),
                "assistant ready"
            );

            let mut session = ChatSession::default();
            let answer = orchestrator.respond(&mut session, &message).await;
            println!("{answer}");
        }
    }

    Ok(())
}

async fn log_status_events(mut feed: mpsc::Receiver<StatusState>) {
    while let Some(state) = feed.recv().await {
        if state.mode == StatusMode::Idle {
            continue;
        }
        info!(
            mode = ?state.mode,
            progress = state.progress,
            step = %state.step,
            "{}",
            state.message
        );
    }
}
