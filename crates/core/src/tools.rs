use crate::ingest::IngestionPipeline;
use crate::models::{NormalizedArguments, RetrievedChunk, ToolCall};
use crate::traits::{KnowledgeSource, RetrievalIndex};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_TOP_K: usize = 5;
const CHAPTER_FETCH_LIMIT: usize = 10;

const INVENTORY_KEYWORDS: &[&str] = &[
    "list",
    "what files",
    "which files",
    "show files",
    "what notes",
];

const CONTENT_KEYWORDS: &[&str] = &[
    "explain",
    "teach",
    "what is",
    "how",
    "describe",
    "tell me about",
];

#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub kind: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<(&'static str, ToolParameter)>,
    pub required: Vec<&'static str>,
}

impl ToolDefinition {
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        for (name, parameter) in &self.parameters {
            properties.insert(
                (*name).to_string(),
                json!({ "type": parameter.kind, "description": parameter.description }),
            );
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": self.required,
                },
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            definitions: vec![search_notes_definition(), list_notes_definition()],
        }
    }

    pub fn enable_chapter_fetch(&mut self) {
        self.add(fetch_chapter_definition());
    }

    pub fn enable_knowledge_fallback(&mut self) {
        self.add(teach_topic_definition());
    }

    pub fn enable_manual_ingestion(&mut self) {
        self.add(ingest_file_definition());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions
            .iter()
            .any(|definition| definition.name == name)
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.definitions.iter().map(ToolDefinition::schema).collect()
    }

    fn add(&mut self, definition: ToolDefinition) {
        if !self.contains(definition.name) {
            self.definitions.push(definition);
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn search_notes_definition() -> ToolDefinition {
    ToolDefinition {
        name: "search_notes",
        description: "Search for information in the user's study notes.",
        parameters: vec![(
            "query",
            ToolParameter {
                kind: "string",
                description: "The search query.",
            },
        )],
        required: vec!["query"],
    }
}

fn list_notes_definition() -> ToolDefinition {
    ToolDefinition {
        name: "list_notes",
        description: "List all available study notes files.",
        parameters: Vec::new(),
        required: Vec::new(),
    }
}

fn fetch_chapter_definition() -> ToolDefinition {
    ToolDefinition {
        name: "fetch_chapter",
        description: "Fetch the user's notes for one chapter, module, or unit.",
        parameters: vec![(
            "chapter_identifier",
            ToolParameter {
                kind: "string",
                description: "The chapter number or name, for example '5' or 'module 2'.",
            },
        )],
        required: vec!["chapter_identifier"],
    }
}

fn teach_topic_definition() -> ToolDefinition {
    ToolDefinition {
        name: "teach_topic",
        description: "Explain a topic that the user's notes do not cover.",
        parameters: vec![(
            "topic",
            ToolParameter {
                kind: "string",
                description: "The topic to explain.",
            },
        )],
        required: vec!["topic"],
    }
}

fn ingest_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: "ingest_file",
        description: "Manually ingest a file into the notes index.",
        parameters: vec![(
            "file_path",
            ToolParameter {
                kind: "string",
                description: "Path to the file to ingest.",
            },
        )],
        required: vec!["file_path"],
    }
}

struct ResolvedCall {
    tool: &'static str,
    arguments: NormalizedArguments,
}

type Predicate = fn(&NormalizedArguments, &str) -> bool;
type Resolver = fn(&NormalizedArguments, &str) -> ResolvedCall;

// Evaluated top to bottom; the last entry always applies.
const RECOVERY_STRATEGIES: &[(Predicate, Resolver)] = &[
    (has_query_argument, search_with_given_arguments),
    (has_chapter_argument, fetch_chapter_with_given_arguments),
    (wants_inventory, list_known_notes),
    (wants_content, search_with_utterance),
    (always_applies, search_with_utterance),
];

fn has_query_argument(arguments: &NormalizedArguments, _: &str) -> bool {
    arguments.has("query") || arguments.positional.is_some()
}

fn has_chapter_argument(arguments: &NormalizedArguments, _: &str) -> bool {
    arguments.has("chapter_identifier")
}

fn wants_inventory(_: &NormalizedArguments, utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    INVENTORY_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

fn wants_content(_: &NormalizedArguments, utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    CONTENT_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

fn always_applies(_: &NormalizedArguments, _: &str) -> bool {
    true
}

fn search_with_given_arguments(arguments: &NormalizedArguments, _: &str) -> ResolvedCall {
    ResolvedCall {
        tool: "search_notes",
        arguments: arguments.clone(),
    }
}

fn fetch_chapter_with_given_arguments(arguments: &NormalizedArguments, _: &str) -> ResolvedCall {
    ResolvedCall {
        tool: "fetch_chapter",
        arguments: arguments.clone(),
    }
}

fn list_known_notes(_: &NormalizedArguments, _: &str) -> ResolvedCall {
    ResolvedCall {
        tool: "list_notes",
        arguments: NormalizedArguments::default(),
    }
}

fn search_with_utterance(_: &NormalizedArguments, utterance: &str) -> ResolvedCall {
    ResolvedCall {
        tool: "search_notes",
        arguments: query_arguments(utterance),
    }
}

fn query_arguments(query: &str) -> NormalizedArguments {
    let mut named = Map::new();
    named.insert("query".to_string(), Value::String(query.to_string()));
    NormalizedArguments {
        named,
        positional: None,
    }
}

fn resolve_tool_call(arguments: &NormalizedArguments, utterance: &str) -> ResolvedCall {
    for (applies, resolve) in RECOVERY_STRATEGIES {
        if applies(arguments, utterance) {
            return resolve(arguments, utterance);
        }
    }

    search_with_utterance(arguments, utterance)
}

fn is_known_tool(name: &str) -> bool {
    matches!(
        name,
        "search_notes" | "list_notes" | "fetch_chapter" | "teach_topic" | "ingest_file"
    )
}

pub struct ToolDispatcher<R, K> {
    index: Arc<R>,
    pipeline: Arc<IngestionPipeline>,
    knowledge: Option<Arc<K>>,
    top_k: usize,
}

impl<R, K> ToolDispatcher<R, K>
where
    R: RetrievalIndex + Send + Sync,
    K: KnowledgeSource + Send + Sync,
{
    pub fn new(
        index: Arc<R>,
        pipeline: Arc<IngestionPipeline>,
        knowledge: Option<Arc<K>>,
    ) -> Self {
        Self {
            index,
            pipeline,
            knowledge,
            top_k: DEFAULT_TOP_K,
        }
    }

    // Dispatch never fails; every failure becomes the tool's result string.
    pub async fn dispatch(&self, call: &ToolCall, last_user_message: &str) -> String {
        let arguments = call.arguments.normalize();

        if is_known_tool(&call.name) {
            return self.execute(&call.name, &arguments).await;
        }

        let resolved = resolve_tool_call(&arguments, last_user_message);
        self.execute(resolved.tool, &resolved.arguments).await
    }

    async fn execute(&self, tool: &str, arguments: &NormalizedArguments) -> String {
        match tool {
            "search_notes" => match arguments.text_or_positional("query") {
                Some(query) if !query.trim().is_empty() => self.search_notes(&query).await,
                _ => "Error: no search query given.".to_string(),
            },
            "list_notes" => self.list_notes().await,
            "fetch_chapter" => match arguments.text_or_positional("chapter_identifier") {
                Some(identifier) if !identifier.trim().is_empty() => {
                    self.fetch_chapter(identifier.trim()).await
                }
                _ => "Error: no chapter identifier given.".to_string(),
            },
            "teach_topic" => match arguments.text_or_positional("topic") {
                Some(topic) if !topic.trim().is_empty() => self.teach_topic(&topic).await,
                _ => "Error: no topic given.".to_string(),
            },
            "ingest_file" => match arguments.text_or_positional("file_path") {
                Some(path) if !path.trim().is_empty() => self.ingest_file(path.trim()).await,
                _ => "Error: no file path given.".to_string(),
            },
            other => format!("Error: Tool {other} not found."),
        }
    }

    async fn search_notes(&self, query: &str) -> String {
        match self.index.query(query, self.top_k).await {
            Ok(hits) => format_search_results(&hits),
            Err(error) => format!("Error: search failed: {error}"),
        }
    }

    async fn list_notes(&self) -> String {
        match self.index.list_filenames().await {
            Ok(files) if files.is_empty() => "No notes indexed.".to_string(),
            Ok(files) => {
                let lines: Vec<String> = files.iter().map(|file| format!("- {file}")).collect();
                format!("Available notes:\n{}", lines.join("\n"))
            }
            Err(error) => format!("Error: listing notes failed: {error}"),
        }
    }

    async fn fetch_chapter(&self, identifier: &str) -> String {
        let matched = self.pipeline.chapter_map().lookup(identifier);
        if matched.is_empty() {
            return format!("No chapter matching '{identifier}' found.");
        }

        let filenames: BTreeSet<String> = matched.values().flatten().cloned().collect();
        let probe = matched.keys().cloned().collect::<Vec<_>>().join(" ");

        match self.index.query(&probe, CHAPTER_FETCH_LIMIT).await {
            Ok(hits) => {
                let scoped: Vec<RetrievedChunk> = hits
                    .into_iter()
                    .filter(|hit| filenames.contains(&hit.metadata.filename))
                    .collect();

                if scoped.is_empty() {
                    let listed: Vec<String> =
                        filenames.iter().map(|file| format!("- {file}")).collect();
                    return format!(
                        "Notes for chapter '{identifier}' are in:\n{}",
                        listed.join("\n")
                    );
                }

                format_search_results(&scoped)
            }
            Err(error) => format!("Error: chapter fetch failed: {error}"),
        }
    }

    async fn teach_topic(&self, topic: &str) -> String {
        match &self.knowledge {
            Some(knowledge) => match knowledge.generate(topic).await {
                Ok(text) if text.trim().is_empty() => {
                    "Error: external knowledge returned nothing.".to_string()
                }
                Ok(text) => text,
                Err(error) => format!("Error: external knowledge failed: {error}"),
            },
            None => "Error: Tool teach_topic is not available.".to_string(),
        }
    }

    async fn ingest_file(&self, path: &str) -> String {
        let file_path = Path::new(path);
        if !file_path.exists() {
            return format!("Error: File {path} not found.");
        }

        match self.pipeline.ingest_file(file_path, self.index.as_ref()).await {
            Ok(outcome) => format!("Successfully ingested {}", outcome.filename),
            Err(error) => format!("Error: ingestion failed: {error}"),
        }
    }
}

fn format_search_results(hits: &[RetrievedChunk]) -> String {
    if hits.is_empty() {
        return "No relevant notes found.".to_string();
    }

    hits.iter()
        .map(|hit| {
            format!(
                "--- Source: {} (Page {}) ---\n{}\n",
                hit.metadata.filename, hit.metadata.page, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::ChapterMap;
    use crate::error::{ChatError, SearchError};
    use crate::models::{ChunkMetadata, IngestionOptions, ToolArguments};
    use crate::status::StatusBroadcaster;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeIndex {
        rows: StdMutex<Vec<(String, ChunkMetadata)>>,
        queries: StdMutex<Vec<String>>,
    }

    impl FakeIndex {
        fn with_rows(rows: Vec<(&str, &str)>) -> Self {
            let stored = rows
                .into_iter()
                .map(|(text, filename)| {
                    (
                        text.to_string(),
                        ChunkMetadata {
                            source_path: format!("./notes/{filename}"),
                            filename: filename.to_string(),
                            page: 1,
                        },
                    )
                })
                .collect();

            Self {
                rows: StdMutex::new(stored),
                queries: StdMutex::default(),
            }
        }

        fn recorded_queries(&self) -> Vec<String> {
            self.queries.lock().expect("lock").clone()
        }

        fn row_count(&self) -> usize {
            self.rows.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl RetrievalIndex for FakeIndex {
        async fn add(
            &self,
            documents: &[String],
            metadatas: &[ChunkMetadata],
            _ids: &[String],
        ) -> Result<(), SearchError> {
            let mut rows = self.rows.lock().expect("lock");
            for (text, metadata) in documents.iter().zip(metadatas) {
                rows.push((text.clone(), metadata.clone()));
            }
            Ok(())
        }

        async fn query(
            &self,
            text: &str,
            top_k: usize,
        ) -> Result<Vec<RetrievedChunk>, SearchError> {
            self.queries.lock().expect("lock").push(text.to_string());

            let needle = text.to_lowercase();
            Ok(self
                .rows
                .lock()
                .expect("lock")
                .iter()
                .filter(|(row, _)| row.to_lowercase().contains(&needle))
                .take(top_k)
                .map(|(row, metadata)| RetrievedChunk {
                    text: row.clone(),
                    metadata: metadata.clone(),
                    score: 0.9,
                })
                .collect())
        }

        async fn delete_by_filename(&self, filename: &str) -> Result<(), SearchError> {
            self.rows
                .lock()
                .expect("lock")
                .retain(|(_, metadata)| metadata.filename != filename);
            Ok(())
        }

        async fn list_filenames(&self) -> Result<BTreeSet<String>, SearchError> {
            Ok(self
                .rows
                .lock()
                .expect("lock")
                .iter()
                .map(|(_, metadata)| metadata.filename.clone())
                .collect())
        }
    }

    struct FakeKnowledge;

    #[async_trait]
    impl KnowledgeSource for FakeKnowledge {
        async fn generate(&self, topic: &str) -> Result<String, ChatError> {
            Ok(format!("Teaching summary for {topic}."))
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn dispatcher(
        dir: &Path,
        index: Arc<FakeIndex>,
        knowledge: Option<Arc<FakeKnowledge>>,
    ) -> ToolDispatcher<FakeIndex, FakeKnowledge> {
        let pipeline = IngestionPipeline::new(
            IngestionOptions::default(),
            ChapterMap::new(dir.join("chapter_map.json")),
            StatusBroadcaster::new(),
        )
        .expect("pipeline");

        ToolDispatcher::new(index, Arc::new(pipeline), knowledge)
    }

    fn named(key: &str, value: &str) -> ToolArguments {
        let mut map = Map::new();
        map.insert(key.to_string(), Value::String(value.to_string()));
        ToolArguments::Structured(map)
    }

    fn empty() -> ToolArguments {
        ToolArguments::Structured(Map::new())
    }

    #[test]
    fn base_registry_always_offers_search_and_listing() {
        let registry = ToolRegistry::new();
        assert!(registry.contains("search_notes"));
        assert!(registry.contains("list_notes"));
        assert_eq!(registry.definitions().len(), 2);
    }

    #[test]
    fn recovery_strategies_resolve_in_priority_order() {
        let query_shaped = named("query", "BFS").normalize();
        let chapter_shaped = named("chapter_identifier", "5").normalize();
        let bare = empty().normalize();

        // Argument shape wins over whatever the utterance says.
        assert_eq!(
            resolve_tool_call(&query_shaped, "what files do I have").tool,
            "search_notes"
        );
        assert_eq!(
            resolve_tool_call(&chapter_shaped, "what files do I have").tool,
            "fetch_chapter"
        );

        // Without arguments the utterance decides.
        assert_eq!(resolve_tool_call(&bare, "list my notes").tool, "list_notes");
        assert_eq!(
            resolve_tool_call(&bare, "explain heaps").tool,
            "search_notes"
        );

        // Ambiguous input falls back to searching with the raw utterance.
        let fallback = resolve_tool_call(&bare, "newton's laws");
        assert_eq!(fallback.tool, "search_notes");
        assert_eq!(
            fallback.arguments.text("query").as_deref(),
            Some("newton's laws")
        );
    }

    #[test]
    fn optional_tools_are_appended_in_enable_order() {
        let mut registry = ToolRegistry::new();
        registry.enable_chapter_fetch();
        registry.enable_knowledge_fallback();
        registry.enable_manual_ingestion();
        registry.enable_chapter_fetch();

        let names: Vec<&str> = registry
            .definitions()
            .iter()
            .map(|definition| definition.name)
            .collect();
        assert_eq!(
            names,
            [
                "search_notes",
                "list_notes",
                "fetch_chapter",
                "teach_topic",
                "ingest_file"
            ]
        );
    }

    #[test]
    fn schemas_render_function_declarations() {
        let schemas = ToolRegistry::new().schemas();

        assert_eq!(
            schemas[0].pointer("/type").and_then(Value::as_str),
            Some("function")
        );
        assert_eq!(
            schemas[0].pointer("/function/name").and_then(Value::as_str),
            Some("search_notes")
        );
        assert_eq!(
            schemas[0]
                .pointer("/function/parameters/properties/query/type")
                .and_then(Value::as_str),
            Some("string")
        );
        assert_eq!(
            schemas[0]
                .pointer("/function/parameters/required/0")
                .and_then(Value::as_str),
            Some("query")
        );
        assert_eq!(
            schemas[1].pointer("/function/parameters/required"),
            Some(&json!([]))
        );
    }

    #[tokio::test]
    async fn search_results_carry_source_headers() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::with_rows(vec![(
            "Binary trees are hierarchical.",
            "Chapter 3 Notes.txt",
        )]));
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new("search_notes", named("query", "binary"));
        let result = dispatcher.dispatch(&call, "tell me about binary trees").await;

        assert_eq!(
            result,
            "--- Source: Chapter 3 Notes.txt (Page 1) ---\nBinary trees are hierarchical.\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn search_without_hits_reports_no_relevant_notes(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("search_notes", named("query", "quantum"));
        assert_eq!(dispatcher.dispatch(&call, "").await, "No relevant notes found.");
        Ok(())
    }

    #[tokio::test]
    async fn listing_reports_known_files_or_empty_index(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;

        let empty_index = Arc::new(FakeIndex::default());
        let empty_dispatcher = dispatcher(dir.path(), empty_index, None);
        let call = ToolCall::new("list_notes", empty());
        assert_eq!(empty_dispatcher.dispatch(&call, "").await, "No notes indexed.");

        let index = Arc::new(FakeIndex::with_rows(vec![
            ("spanning trees", "b.pdf"),
            ("traversals", "a.txt"),
        ]));
        let dispatcher = dispatcher(dir.path(), index, None);
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "Available notes:\n- a.txt\n- b.pdf"
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_name_with_query_argument_recovers_to_search(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::with_rows(vec![(
            "BFS explores level by level.",
            "graphs.txt",
        )]));
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new("", named("query", "BFS"));
        let result = dispatcher.dispatch(&call, "what is bfs?").await;

        assert!(result.starts_with("--- Source: graphs.txt"));
        assert_eq!(index.recorded_queries(), vec!["BFS".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_name_with_chapter_argument_recovers_to_chapter_fetch(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        ChapterMap::new(dir.path().join("chapter_map.json"))
            .record(&["chapter 5".to_string()], "Module 5.txt")?;

        let index = Arc::new(FakeIndex::with_rows(vec![(
            "Chapter 5 covers recursion.",
            "Module 5.txt",
        )]));
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("", named("chapter_identifier", "5"));
        let result = dispatcher.dispatch(&call, "show me chapter five").await;

        assert!(result.starts_with("--- Source: Module 5.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_name_without_arguments_follows_inventory_intent(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::with_rows(vec![("traversals", "a.txt")]));
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("", empty());
        let result = dispatcher.dispatch(&call, "what files do I have").await;

        assert_eq!(result, "Available notes:\n- a.txt");
        Ok(())
    }

    #[tokio::test]
    async fn ambiguous_recovery_searches_with_the_raw_utterance(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new("", empty());
        let result = dispatcher.dispatch(&call, "newton's second law").await;

        assert_eq!(result, "No relevant notes found.");
        assert_eq!(
            index.recorded_queries(),
            vec!["newton's second law".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unrecognized_name_recovers_from_argument_shape(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new("vector_search", named("query", "BFS"));
        dispatcher.dispatch(&call, "look up bfs").await;

        assert_eq!(index.recorded_queries(), vec!["BFS".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn raw_positional_arguments_are_query_shaped() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new("", ToolArguments::Raw("binary trees".to_string()));
        dispatcher.dispatch(&call, "tell me about binary trees").await;

        assert_eq!(index.recorded_queries(), vec!["binary trees".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn chapter_fetch_without_mapping_reports_unknown_chapter(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("fetch_chapter", named("chapter_identifier", "9"));
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "No chapter matching '9' found."
        );
        Ok(())
    }

    #[tokio::test]
    async fn chapter_fetch_names_files_when_no_chunks_match(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        ChapterMap::new(dir.path().join("chapter_map.json"))
            .record(&["unit 2".to_string()], "Unit 2.pdf")?;

        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("fetch_chapter", named("chapter_identifier", "2"));
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "Notes for chapter '2' are in:\n- Unit 2.pdf"
        );
        Ok(())
    }

    #[tokio::test]
    async fn chapter_fetch_scopes_results_to_mapped_files(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        ChapterMap::new(dir.path().join("chapter_map.json"))
            .record(&["chapter 3".to_string()], "Chapter 3 Notes.txt")?;

        let index = Arc::new(FakeIndex::with_rows(vec![
            ("Chapter 3 covers binary trees.", "Chapter 3 Notes.txt"),
            ("Chapter 3 summary from somewhere else.", "other.txt"),
        ]));
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("fetch_chapter", named("chapter_identifier", "3"));
        let result = dispatcher.dispatch(&call, "").await;

        assert!(result.contains("Chapter 3 Notes.txt"));
        assert!(!result.contains("other.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn teach_topic_consults_the_knowledge_source() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, Some(Arc::new(FakeKnowledge)));

        let call = ToolCall::new("teach_topic", named("topic", "gradient descent"));
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "Teaching summary for gradient descent."
        );
        Ok(())
    }

    #[tokio::test]
    async fn teach_topic_without_knowledge_reports_unavailable(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("teach_topic", named("topic", "gradient descent"));
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "Error: Tool teach_topic is not available."
        );
        Ok(())
    }

    #[tokio::test]
    async fn ingest_tool_reports_missing_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), index, None);

        let call = ToolCall::new("ingest_file", named("file_path", "/definitely/missing.txt"));
        assert_eq!(
            dispatcher.dispatch(&call, "").await,
            "Error: File /definitely/missing.txt not found."
        );
        Ok(())
    }

    #[tokio::test]
    async fn ingest_tool_ingests_and_reports_the_basename(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let notes = dir.path().join("Physics Notes.txt");
        fs::write(&notes, "Force equals mass times acceleration.")?;

        let index = Arc::new(FakeIndex::default());
        let dispatcher = dispatcher(dir.path(), Arc::clone(&index), None);

        let call = ToolCall::new(
            "ingest_file",
            named("file_path", notes.to_string_lossy().as_ref()),
        );
        let result = dispatcher.dispatch(&call, "").await;

        assert_eq!(result, "Successfully ingested Physics Notes.txt");
        assert!(index.row_count() > 0);
        Ok(())
    }

    #[tokio::test]
    async fn synced_notes_are_reachable_by_search_and_chapter_fetch(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let notes_dir = dir.path().join("notes");
        fs::create_dir(&notes_dir)?;
        fs::write(
            notes_dir.join("Chapter 3 Notes.txt"),
            "Binary trees are covered in chapter 3. Every node has at most two children.",
        )?;

        let pipeline = Arc::new(
            IngestionPipeline::new(
                IngestionOptions::default(),
                ChapterMap::new(dir.path().join("chapter_map.json")),
                StatusBroadcaster::new(),
            )
            .expect("pipeline"),
        );
        let index = Arc::new(FakeIndex::default());

        let report = pipeline.sync_folder(&notes_dir, index.as_ref()).await?;
        assert_eq!(report.ingested.len(), 1);

        let dispatcher: ToolDispatcher<FakeIndex, FakeKnowledge> =
            ToolDispatcher::new(Arc::clone(&index), pipeline, None);

        let search = ToolCall::new("search_notes", named("query", "binary tree"));
        let hits = dispatcher.dispatch(&search, "").await;
        assert!(hits.starts_with("--- Source: Chapter 3 Notes.txt (Page 1) ---"));

        let fetch = ToolCall::new("fetch_chapter", named("chapter_identifier", "3"));
        let chapter = dispatcher.dispatch(&fetch, "").await;
        assert!(chapter.starts_with("--- Source: Chapter 3 Notes.txt"));
        assert!(chapter.contains("Binary trees"));
        Ok(())
    }
}
