use crate::error::{ChatError, SearchError};
use crate::models::{ChatMessage, ChatOutcome, ChunkMetadata, RetrievedChunk};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

#[async_trait]
pub trait RetrievalIndex {
    async fn add(
        &self,
        documents: &[String],
        metadatas: &[ChunkMetadata],
        ids: &[String],
    ) -> Result<(), SearchError>;

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, SearchError>;

    async fn delete_by_filename(&self, filename: &str) -> Result<(), SearchError>;

    async fn list_filenames(&self) -> Result<BTreeSet<String>, SearchError>;
}

#[async_trait]
pub trait ChatModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatOutcome, ChatError>;
}

#[async_trait]
pub trait KnowledgeSource {
    async fn generate(&self, topic: &str) -> Result<String, ChatError>;

    async fn is_reachable(&self) -> bool;
}
