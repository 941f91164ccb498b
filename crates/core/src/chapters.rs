use crate::error::IngestError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const MAX_TITLE_CHARS: usize = 50;

const TAG_PATTERN: &str = r"(?i)\b(module|chapter|unit)(?:\s*([0-9]+|[ivxlcdm]+)|\s+([a-z]))\b";

pub struct ChapterMapper {
    tag_pattern: Regex,
}

impl ChapterMapper {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            tag_pattern: Regex::new(TAG_PATTERN)?,
        })
    }

    pub fn classify(&self, filename: &str, content_head: &str) -> Vec<String> {
        let from_name = self.tag_keys(filename);
        if !from_name.is_empty() {
            return from_name;
        }

        let from_content = self.tag_keys(content_head);
        if !from_content.is_empty() {
            return from_content;
        }

        if let Some(key) = title_key(content_head) {
            return vec![key];
        }

        vec![filename_topic_key(filename)]
    }

    fn tag_keys(&self, text: &str) -> Vec<String> {
        // Underscores and hyphens defeat \b, so tags are matched on a
        // separator-normalized copy.
        let normalized = text.replace(['_', '-'], " ");

        let mut keys = BTreeSet::new();
        for captures in self.tag_pattern.captures_iter(&normalized) {
            let prefix = captures.get(1).map(|m| m.as_str().to_lowercase());
            let value = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map(|m| m.as_str().to_lowercase());

            if let (Some(prefix), Some(value)) = (prefix, value) {
                keys.insert(format!("{prefix} {value}"));
            }
        }

        keys.into_iter().collect()
    }
}

fn title_key(content_head: &str) -> Option<String> {
    let line = content_head
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;

    if line.chars().count() > MAX_TITLE_CHARS {
        return None;
    }

    let cleaned = clean_title(line);
    if cleaned.is_empty() {
        return None;
    }

    Some(format!("topic: {cleaned}"))
}

fn clean_title(line: &str) -> String {
    let lowered = line.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn filename_topic_key(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);

    let spaced = stem.replace(['_', '-'], " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("topic: {}", collapsed.to_lowercase())
}

#[derive(Debug, Clone)]
pub struct ChapterMap {
    path: PathBuf,
}

impl ChapterMap {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> BTreeMap<String, BTreeSet<String>> {
        // A missing or unreadable map reads as empty; the next successful
        // write repairs the file.
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return BTreeMap::new(),
        };

        serde_json::from_str(&raw).unwrap_or_default()
    }

    pub fn record(&self, keys: &[String], filename: &str) -> Result<(), IngestError> {
        let mut map = self.load();
        for key in keys {
            map.entry(key.clone())
                .or_default()
                .insert(filename.to_string());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|error| IngestError::ChapterMap(error.to_string()))?;
            }
        }

        let serialized = serde_json::to_string_pretty(&map)
            .map_err(|error| IngestError::ChapterMap(error.to_string()))?;
        std::fs::write(&self.path, serialized)
            .map_err(|error| IngestError::ChapterMap(error.to_string()))?;

        Ok(())
    }

    pub fn lookup(&self, identifier: &str) -> BTreeMap<String, BTreeSet<String>> {
        let needle = identifier.trim().to_lowercase();
        if needle.is_empty() {
            return BTreeMap::new();
        }

        self.load()
            .into_iter()
            .filter(|(key, _)| key_matches(key, &needle))
            .collect()
    }
}

fn key_matches(key: &str, needle: &str) -> bool {
    if key == needle || key == format!("topic: {needle}").as_str() {
        return true;
    }

    key.rsplit(' ').next() == Some(needle)
}
