use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub filename: String,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub content_head_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            content_head_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionOutcome {
    pub filename: String,
    pub chunk_count: usize,
    pub chapter_keys: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub ingested: Vec<IngestionOutcome>,
    pub skipped_files: Vec<SkippedFile>,
    pub remapped_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Raw(String),
    Structured(Map<String, Value>),
}

impl ToolArguments {
    pub fn normalize(&self) -> NormalizedArguments {
        match self {
            ToolArguments::Structured(map) => NormalizedArguments {
                named: map.clone(),
                positional: None,
            },
            ToolArguments::Raw(text) => match serde_json::from_str::<Map<String, Value>>(text) {
                Ok(map) => NormalizedArguments {
                    named: map,
                    positional: None,
                },
                Err(_) => NormalizedArguments {
                    named: Map::new(),
                    positional: Some(text.clone()),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedArguments {
    pub named: Map<String, Value>,
    pub positional: Option<String>,
}

impl NormalizedArguments {
    pub fn text(&self, key: &str) -> Option<String> {
        self.named.get(key).and_then(value_as_text)
    }

    pub fn text_or_positional(&self, key: &str) -> Option<String> {
        self.text(key).or_else(|| self.positional.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.named
            .get(key)
            .map(|value| !value.is_null())
            .unwrap_or(false)
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_arguments_normalize_to_named_values() {
        let arguments = ToolArguments::Raw(r#"{"query": "binary trees"}"#.to_string());
        let normalized = arguments.normalize();

        assert_eq!(normalized.text("query").as_deref(), Some("binary trees"));
        assert!(normalized.positional.is_none());
    }

    #[test]
    fn unparseable_raw_arguments_become_positional() {
        let arguments = ToolArguments::Raw("what is dijkstra".to_string());
        let normalized = arguments.normalize();

        assert!(normalized.named.is_empty());
        assert_eq!(normalized.positional.as_deref(), Some("what is dijkstra"));
        assert_eq!(
            normalized.text_or_positional("query").as_deref(),
            Some("what is dijkstra")
        );
    }

    #[test]
    fn structured_arguments_expose_numbers_as_text() {
        let mut map = Map::new();
        map.insert("chapter_identifier".to_string(), json!(5));
        let normalized = ToolArguments::Structured(map).normalize();

        assert!(normalized.has("chapter_identifier"));
        assert_eq!(normalized.text("chapter_identifier").as_deref(), Some("5"));
    }
}
