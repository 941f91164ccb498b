use crate::error::ChatError;
use crate::models::{ChatMessage, ChatOutcome, ChatRole, ToolArguments, ToolCall};
use crate::traits::{ChatModel, KnowledgeSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use url::Url;

pub struct OllamaClient {
    base_url: Url,
    model: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            model: model.into(),
            client: Client::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn health_check(&self) -> bool {
        match self.client.get(self.base_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        Ok(self.base_url.join(path)?)
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    tools: Option<&'a [Value]>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatOutcome, ChatError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(wire_message).collect(),
            stream: false,
            tools,
        };

        let response = self
            .client
            .post(self.endpoint("/api/chat")?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(outcome_from_response(&parsed))
    }
}

#[async_trait]
impl KnowledgeSource for OllamaClient {
    async fn generate(&self, topic: &str) -> Result<String, ChatError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: format!("Explain the following topic in a clear, teaching style: {topic}"),
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint("/api/generate")?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn is_reachable(&self) -> bool {
        self.health_check().await
    }
}

fn wire_message(message: &ChatMessage) -> WireMessage {
    WireMessage {
        role: role_name(message.role),
        content: message.content.clone(),
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn outcome_from_response(parsed: &Value) -> ChatOutcome {
    let content = parsed
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let calls = parsed
        .pointer("/message/tool_calls")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let tool_calls = calls
        .iter()
        .map(|call| {
            let name = call
                .pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let arguments = match call.pointer("/function/arguments") {
                Some(Value::Object(map)) => ToolArguments::Structured(map.clone()),
                Some(Value::String(raw)) => ToolArguments::Raw(raw.clone()),
                Some(other) if !other.is_null() => ToolArguments::Raw(other.to_string()),
                _ => ToolArguments::Raw(String::new()),
            };

            ToolCall::new(name, arguments)
        })
        .collect();

    ChatOutcome {
        content,
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::{outcome_from_response, role_name, OllamaClient};
    use crate::models::{ChatRole, ToolArguments};
    use serde_json::json;

    #[test]
    fn client_requires_a_valid_base_url() {
        let client = OllamaClient::new("http://localhost:11434", "mistral").expect("valid url");
        assert_eq!(client.model(), "mistral");

        assert!(OllamaClient::new("not a url", "mistral").is_err());
    }

    #[test]
    fn plain_reply_has_content_and_no_tool_calls() {
        let response = json!({
            "message": { "role": "assistant", "content": "BFS explores level by level." },
            "done": true,
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.content, "BFS explores level by level.");
        assert!(outcome.tool_calls.is_empty());
    }

    #[test]
    fn structured_tool_arguments_are_preserved() {
        let response = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "search_notes", "arguments": { "query": "BFS" } } },
                ],
            },
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "search_notes");

        let normalized = outcome.tool_calls[0].arguments.normalize();
        assert_eq!(normalized.text("query").as_deref(), Some("BFS"));
    }

    #[test]
    fn string_tool_arguments_stay_raw() {
        let response = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "", "arguments": "{\"chapter_identifier\": \"5\"}" } },
                ],
            },
        });

        let outcome = outcome_from_response(&response);
        assert_eq!(outcome.tool_calls[0].name, "");
        assert_eq!(
            outcome.tool_calls[0].arguments,
            ToolArguments::Raw("{\"chapter_identifier\": \"5\"}".to_string())
        );
    }

    #[test]
    fn missing_pieces_degrade_to_empty_values() {
        let response = json!({
            "message": {
                "tool_calls": [ { "function": {} } ],
            },
        });

        let outcome = outcome_from_response(&response);
        assert!(outcome.content.is_empty());
        assert_eq!(outcome.tool_calls[0].name, "");
        assert_eq!(outcome.tool_calls[0].arguments, ToolArguments::Raw(String::new()));
    }

    #[test]
    fn roles_map_to_wire_names() {
        assert_eq!(role_name(ChatRole::System), "system");
        assert_eq!(role_name(ChatRole::Tool), "tool");
    }
}
