use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::SearchError;
use crate::models::{ChunkMetadata, RetrievedChunk};
use crate::traits::RetrievalIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const SCROLL_PAGE_SIZE: usize = 256;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: CharacterNgramEmbedder,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            embedder: CharacterNgramEmbedder::default(),
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let probe = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if probe.status().is_success() {
            return Ok(());
        }

        if probe.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(backend_error(probe.status()));
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

#[async_trait]
impl RetrievalIndex for QdrantStore {
    async fn add(
        &self,
        documents: &[String],
        metadatas: &[ChunkMetadata],
        ids: &[String],
    ) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }

        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(SearchError::Request(format!(
                "documents {}, metadata {}, and ids {} must have matching lengths",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }

        let points = documents
            .iter()
            .zip(metadatas.iter())
            .zip(ids.iter())
            .map(|((text, metadata), chunk_id)| {
                json!({
                    "id": point_id(chunk_id),
                    "vector": self.embedder.embed(text),
                    "payload": {
                        "chunk_id": chunk_id,
                        "text": text,
                        "source_path": metadata.source_path,
                        "filename": metadata.filename,
                        "page": metadata.page,
                    },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": self.embedder.embed(text),
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(hits_from_response(&parsed))
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "filename", "match": { "value": filename } },
                    ],
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn list_filenames(&self) -> Result<BTreeSet<String>, SearchError> {
        let mut filenames = BTreeSet::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE_SIZE,
                "with_payload": ["filename"],
                "with_vector": false,
            });
            if let Some(cursor) = &offset {
                body["offset"] = cursor.clone();
            }

            let response = self
                .client
                .post(format!(
                    "{}/collections/{}/points/scroll",
                    self.endpoint, self.collection
                ))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }

            let parsed: Value = response.json().await?;
            let (page, next_offset) = filenames_from_scroll(&parsed);
            filenames.extend(page);

            match next_offset {
                Some(cursor) => offset = Some(cursor),
                None => break,
            }
        }

        Ok(filenames)
    }
}

fn backend_error(status: reqwest::StatusCode) -> SearchError {
    SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn point_id(chunk_id: &str) -> u64 {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn hits_from_response(parsed: &Value) -> Vec<RetrievedChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for hit in hits {
        let text = hit
            .pointer("/payload/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let source_path = hit
            .pointer("/payload/source_path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let filename = hit
            .pointer("/payload/filename")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let page = hit
            .pointer("/payload/page")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

        results.push(RetrievedChunk {
            text,
            metadata: ChunkMetadata {
                source_path,
                filename,
                page,
            },
            score,
        });
    }

    results
}

fn filenames_from_scroll(parsed: &Value) -> (Vec<String>, Option<Value>) {
    let points = parsed
        .pointer("/result/points")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let filenames = points
        .iter()
        .filter_map(|point| {
            point
                .pointer("/payload/filename")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();

    let next_offset = match parsed.pointer("/result/next_page_offset") {
        Some(cursor) if !cursor.is_null() => Some(cursor.clone()),
        _ => None,
    };

    (filenames, next_offset)
}

#[cfg(test)]
mod tests {
    use super::{filenames_from_scroll, hits_from_response, point_id};
    use serde_json::json;

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        let first = point_id("notes.txt_0_ab12cd34");
        let again = point_id("notes.txt_0_ab12cd34");
        let other = point_id("notes.txt_1_ab12cd34");

        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn search_hits_are_parsed_from_payload() {
        let response = json!({
            "result": [
                {
                    "id": 17,
                    "score": 0.87,
                    "payload": {
                        "chunk_id": "Chapter 3 Notes.txt_0_ab12cd34",
                        "text": "Binary trees are hierarchical structures.",
                        "source_path": "/notes/Chapter 3 Notes.txt",
                        "filename": "Chapter 3 Notes.txt",
                        "page": 1,
                    },
                },
            ],
        });

        let hits = hits_from_response(&response);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.filename, "Chapter 3 Notes.txt");
        assert_eq!(hits[0].metadata.page, 1);
        assert!((hits[0].score - 0.87).abs() < 1e-9);
    }

    #[test]
    fn scroll_pages_carry_filenames_and_cursor() {
        let page = json!({
            "result": {
                "points": [
                    { "payload": { "filename": "a.txt" } },
                    { "payload": { "filename": "b.pdf" } },
                ],
                "next_page_offset": 42,
            },
        });

        let (filenames, cursor) = filenames_from_scroll(&page);
        assert_eq!(filenames, vec!["a.txt".to_string(), "b.pdf".to_string()]);
        assert_eq!(cursor, Some(json!(42)));

        let last_page = json!({
            "result": { "points": [], "next_page_offset": null },
        });
        let (empty, end) = filenames_from_scroll(&last_page);
        assert!(empty.is_empty());
        assert!(end.is_none());
    }
}
