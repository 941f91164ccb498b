use crate::error::ChatError;
use crate::models::{ChatMessage, ChatOutcome};
use crate::status::{StatusBroadcaster, StatusMode};
use crate::tools::{ToolDispatcher, ToolRegistry};
use crate::traits::{ChatModel, KnowledgeSource, RetrievalIndex};
use serde_json::Value;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a study assistant grounded in the user's own notes. \
Use the available tools to look up the notes before answering, name the source files you drew from, \
and say plainly when the notes do not cover a question.";

pub const FALLBACK_NOTICE: &str =
    "I could not come up with an answer for that. Please try rephrasing your question.";

pub struct ChatSession {
    system_prompt: String,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let history = vec![ChatMessage::system(system_prompt.clone())];
        Self {
            system_prompt,
            history,
        }
    }

    pub fn reset(&mut self) {
        self.history = vec![ChatMessage::system(self.system_prompt.clone())];
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

pub struct ConversationOrchestrator<M, R, K>
where
    M: ChatModel,
    R: RetrievalIndex,
    K: KnowledgeSource,
{
    model: M,
    registry: ToolRegistry,
    dispatcher: ToolDispatcher<R, K>,
    status: StatusBroadcaster,
}

impl<M, R, K> ConversationOrchestrator<M, R, K>
where
    M: ChatModel + Send + Sync,
    R: RetrievalIndex + Send + Sync,
    K: KnowledgeSource + Send + Sync,
{
    pub fn new(
        model: M,
        registry: ToolRegistry,
        dispatcher: ToolDispatcher<R, K>,
        status: StatusBroadcaster,
    ) -> Self {
        Self {
            model,
            registry,
            dispatcher,
            status,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn respond(&self, session: &mut ChatSession, user_text: &str) -> String {
        session.push(ChatMessage::user(user_text));

        self.status
            .set(StatusMode::Thinking, "Thinking...", 30, "model");

        let schemas = self.registry.schemas();
        let reply = match self.chat_with_retry(session.history(), Some(&schemas)).await {
            Ok(reply) => reply,
            Err(error) => return self.surface_model_failure(session, &error),
        };

        if reply.tool_calls.is_empty() {
            return self.finish(session, reply.content);
        }

        session.push(tool_marker_message(&reply));

        // Results land in history in request order; calls run one at a time.
        for call in &reply.tool_calls {
            let label = display_name(&call.name);
            self.status
                .set(StatusMode::ToolCall, format!("Running {label}..."), 60, "tools");

            let result = self.dispatcher.dispatch(call, user_text).await;
            session.push(ChatMessage::tool(label, result));
        }

        self.status
            .set(StatusMode::Thinking, "Composing answer...", 85, "model");

        // The follow-up request goes out without the tool schema.
        match self.chat_with_retry(session.history(), None).await {
            Ok(followup) => self.finish(session, followup.content),
            Err(error) => self.surface_model_failure(session, &error),
        }
    }

    async fn chat_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatOutcome, ChatError> {
        match self.model.chat(messages, tools).await {
            Ok(reply) => Ok(reply),
            // One retry, always without the tool schema.
            Err(_) => self.model.chat(messages, None).await,
        }
    }

    fn finish(&self, session: &mut ChatSession, content: String) -> String {
        let answer = if content.trim().is_empty() {
            FALLBACK_NOTICE.to_string()
        } else {
            content
        };

        session.push(ChatMessage::assistant(answer.clone()));
        self.status
            .set(StatusMode::Complete, "Answer ready", 100, "complete");
        self.status.set_idle();
        answer
    }

    fn surface_model_failure(&self, session: &mut ChatSession, error: &ChatError) -> String {
        self.status.set(
            StatusMode::Error,
            format!("Model request failed: {error}"),
            100,
            "error",
        );
        self.status.set_idle();

        let answer = format!("I could not reach the language model: {error}");
        session.push(ChatMessage::assistant(answer.clone()));
        answer
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "recovered_tool"
    } else {
        name
    }
}

fn tool_marker_message(reply: &ChatOutcome) -> ChatMessage {
    let markers = serde_json::to_string(&reply.tool_calls).unwrap_or_default();
    let content = if reply.content.trim().is_empty() {
        format!("[tool calls] {markers}")
    } else {
        format!("{}\n[tool calls] {markers}", reply.content)
    };

    ChatMessage::assistant(content)
}
