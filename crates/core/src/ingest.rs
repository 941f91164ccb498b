use crate::chapters::{ChapterMap, ChapterMapper};
use crate::chunking::{chunk_text, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::{extract_file_units, file_extension, is_supported_file};
use crate::models::{
    ChunkMetadata, IngestionOptions, IngestionOutcome, NoteChunk, SkippedFile, SyncReport,
};
use crate::status::{StatusBroadcaster, StatusMode};
use crate::traits::RetrievalIndex;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;
use walkdir::WalkDir;

pub fn discover_note_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_supported_file(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct IngestionPipeline {
    options: IngestionOptions,
    config: ChunkingConfig,
    mapper: ChapterMapper,
    chapters: ChapterMap,
    status: StatusBroadcaster,
    write_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        options: IngestionOptions,
        chapters: ChapterMap,
        status: StatusBroadcaster,
    ) -> Result<Self, IngestError> {
        let config = ChunkingConfig::try_from(options)?;

        Ok(Self {
            options,
            config,
            mapper: ChapterMapper::new()?,
            chapters,
            status,
            write_lock: Mutex::new(()),
        })
    }

    pub fn chapter_map(&self) -> &ChapterMap {
        &self.chapters
    }

    pub async fn ingest_file<R>(
        &self,
        path: &Path,
        index: &R,
    ) -> Result<IngestionOutcome, IngestError>
    where
        R: RetrievalIndex + Send + Sync,
    {
        let filename = file_name_of(path)?;

        // Single-writer discipline: index mutation and the chapter map's
        // read-modify-write both happen under this lock.
        let _guard = self.write_lock.lock().await;

        match self.ingest_locked(path, &filename, index).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.status.set(
                    StatusMode::Error,
                    format!("Ingestion failed for {filename}"),
                    100,
                    "error",
                );
                self.status.set_idle();
                Err(error)
            }
        }
    }

    async fn ingest_locked<R>(
        &self,
        path: &Path,
        filename: &str,
        index: &R,
    ) -> Result<IngestionOutcome, IngestError>
    where
        R: RetrievalIndex + Send + Sync,
    {
        self.status.set(
            StatusMode::Processing,
            format!("Starting ingestion for {filename}"),
            10,
            "init",
        );

        let units = extract_file_units(path)?;

        if units.is_empty() {
            self.status.set(
                StatusMode::Error,
                format!("No text found in {filename}"),
                100,
                "error",
            );
            self.status.set_idle();

            return Ok(IngestionOutcome {
                filename: filename.to_string(),
                chunk_count: 0,
                chapter_keys: Vec::new(),
                ingested_at: Utc::now(),
            });
        }

        self.status.set(
            StatusMode::Processing,
            format!("Chunking {filename}..."),
            40,
            "chunking",
        );

        let source_path = path.to_string_lossy().to_string();
        let mut chunks = Vec::new();
        let mut ordinal = 0usize;

        for unit in &units {
            for piece in chunk_text(&unit.text, self.config) {
                chunks.push(NoteChunk {
                    chunk_id: format!("{filename}_{ordinal}_{}", short_suffix()),
                    text: piece,
                    metadata: ChunkMetadata {
                        source_path: source_path.clone(),
                        filename: filename.to_string(),
                        page: unit.unit,
                    },
                });
                ordinal += 1;
            }
        }

        let concatenated = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let head: String = concatenated
            .chars()
            .take(self.options.content_head_chars)
            .collect();
        let chapter_keys = self.mapper.classify(filename, &head);

        // Last write wins: whatever an earlier run indexed for this filename
        // is removed before the new batch goes in.
        index.delete_by_filename(filename).await?;
        self.chapters.record(&chapter_keys, filename)?;

        self.status.set(
            StatusMode::Processing,
            format!("Embedding {} chunks...", chunks.len()),
            70,
            "embedding",
        );

        let documents: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let metadatas: Vec<ChunkMetadata> = chunks
            .iter()
            .map(|chunk| chunk.metadata.clone())
            .collect();
        let ids: Vec<String> = chunks.iter().map(|chunk| chunk.chunk_id.clone()).collect();

        index.add(&documents, &metadatas, &ids).await?;

        self.status.set(
            StatusMode::Complete,
            format!("Successfully processed {filename}"),
            100,
            "complete",
        );
        self.status.set_idle();

        Ok(IngestionOutcome {
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            chapter_keys,
            ingested_at: Utc::now(),
        })
    }

    pub async fn sync_folder<R>(&self, folder: &Path, index: &R) -> Result<SyncReport, IngestError>
    where
        R: RetrievalIndex + Send + Sync,
    {
        std::fs::create_dir_all(folder)?;

        let files = discover_note_files(folder);
        let known = index.list_filenames().await?;

        let mut report = SyncReport::default();

        for path in files {
            let filename = match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            // Chapter mapping is re-run for every file; full ingestion only
            // for filenames the index has never seen.
            match self.remap_file(&path, &filename).await {
                Ok(()) => report.remapped_files += 1,
                Err(error) => {
                    report.skipped_files.push(SkippedFile {
                        path: path.clone(),
                        reason: error.to_string(),
                    });
                    continue;
                }
            }

            if known.contains(&filename) {
                continue;
            }

            match self.ingest_file(&path, index).await {
                Ok(outcome) => report.ingested.push(outcome),
                Err(error) => report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(report)
    }

    async fn remap_file(&self, path: &Path, filename: &str) -> Result<(), IngestError> {
        // Only plain-text heads are read here; other formats classify on
        // the filename alone.
        let head = match file_extension(path).as_str() {
            "txt" => read_text_head(path, self.options.content_head_chars)?,
            _ => String::new(),
        };

        let keys = self.mapper.classify(filename, &head);

        let _guard = self.write_lock.lock().await;
        self.chapters.record(&keys, filename)
    }
}

fn file_name_of(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

fn read_text_head(path: &Path, head_chars: usize) -> Result<String, IngestError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.chars().take(head_chars).collect())
}

fn short_suffix() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..8].to_string()
}
