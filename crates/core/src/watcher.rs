use crate::error::IngestError;
use crate::ingest::{discover_note_files, IngestionPipeline};
use crate::traits::RetrievalIndex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
        }
    }
}

pub struct DirectoryWatcher {
    folder: PathBuf,
    config: WatcherConfig,
}

impl DirectoryWatcher {
    pub fn new(folder: impl Into<PathBuf>, config: WatcherConfig) -> Self {
        Self {
            folder: folder.into(),
            config,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub async fn run<R>(&self, pipeline: &IngestionPipeline, index: &R) -> Result<(), IngestError>
    where
        R: RetrievalIndex + Send + Sync,
    {
        std::fs::create_dir_all(&self.folder)?;

        // Whatever is already on disk is the baseline; only later changes
        // trigger ingestion. Startup drift is the sync operation's job.
        let mut state = WatchState::baseline(scan(&self.folder));
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let current = scan(&self.folder);
            let ready = state.settled(&current, Instant::now(), self.config.settle_delay);

            for path in ready {
                // Failures are reported through the pipeline's status channel
                // and must not stop the watch loop.
                let _ = pipeline.ingest_file(&path, index).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileState {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingChange {
    state: FileState,
    since: Instant,
}

#[derive(Default)]
struct WatchState {
    seen: HashMap<PathBuf, FileState>,
    pending: HashMap<PathBuf, PendingChange>,
}

impl WatchState {
    fn baseline(current: HashMap<PathBuf, FileState>) -> Self {
        Self {
            seen: current,
            pending: HashMap::new(),
        }
    }

    // Returns the paths that have stopped changing for at least `settle`.
    // A path keeps its timer only while its metadata stays put; any further
    // write re-arms it.
    fn settled(
        &mut self,
        current: &HashMap<PathBuf, FileState>,
        now: Instant,
        settle: Duration,
    ) -> Vec<PathBuf> {
        for (path, file_state) in current {
            if self.seen.get(path) == Some(file_state) {
                continue;
            }

            match self.pending.get(path) {
                Some(entry) if entry.state == *file_state => {}
                _ => {
                    self.pending.insert(
                        path.clone(),
                        PendingChange {
                            state: *file_state,
                            since: now,
                        },
                    );
                }
            }
        }

        self.seen.retain(|path, _| current.contains_key(path));
        self.pending.retain(|path, _| current.contains_key(path));

        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.since) >= settle)
            .map(|(path, _)| path.clone())
            .collect();
        ready.sort_unstable();

        for path in &ready {
            if let Some(entry) = self.pending.remove(path) {
                self.seen.insert(path.clone(), entry.state);
            }
        }

        ready
    }
}

fn scan(folder: &Path) -> HashMap<PathBuf, FileState> {
    discover_note_files(folder)
        .into_iter()
        .filter(|path| !is_ignored(path))
        .filter_map(|path| file_state(&path).map(|state| (path, state)))
        .collect()
}

fn is_ignored(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");

    name.starts_with('~') || name.ends_with(".tmp")
}

fn file_state(path: &Path) -> Option<FileState> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(FileState {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}
