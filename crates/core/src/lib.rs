pub mod chapters;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod orchestrator;
pub mod status;
pub mod stores;
pub mod tools;
pub mod traits;
pub mod watcher;

pub use chapters::{ChapterMap, ChapterMapper};
pub use chunking::{chunk_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ChatError, IngestError, SearchError};
pub use extractor::{extract_file_units, is_supported_file, UnitText, SUPPORTED_EXTENSIONS};
pub use ingest::{discover_note_files, IngestionPipeline};
pub use models::{
    ChatMessage, ChatOutcome, ChatRole, ChunkMetadata, IngestionOptions, IngestionOutcome,
    NoteChunk, RetrievedChunk, SkippedFile, SyncReport, ToolArguments, ToolCall,
};
pub use ollama::OllamaClient;
pub use orchestrator::{ChatSession, ConversationOrchestrator, DEFAULT_SYSTEM_PROMPT};
pub use status::{StatusBroadcaster, StatusMode, StatusState};
pub use stores::QdrantStore;
pub use tools::{ToolDefinition, ToolDispatcher, ToolParameter, ToolRegistry};
pub use traits::{ChatModel, KnowledgeSource, RetrievalIndex};
pub use watcher::{DirectoryWatcher, WatcherConfig};
