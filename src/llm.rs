/// Answer generation against an OpenAI-compatible chat-completion endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::document::Chunk;
use crate::error::{PipelineError, Result};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Represents a message in the chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user" or "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

impl ChatResponse {
    /// Content of the first choice; a null content is an empty answer
    fn into_answer(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| PipelineError::Completion("no choices in response".to_string()))
    }
}

/// Some OpenAI-compatible servers send `"content": null` for an empty reply
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        log::info!("Generating response using {}", self.model);

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Completion(format!("failed to send chat completion request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(PipelineError::Completion(format!(
                "API error (status {}): {}",
                status, error_text
            )));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Completion(format!("failed to parse chat completion response: {}", e)))?;

        response.into_answer()
    }
}

/// Formats retrieved chunks and the question into a prompt and asks the model
#[derive(Clone)]
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// System instruction plus one user message carrying chunks and query
    pub fn build_prompt(query: &str, chunks: &[Chunk]) -> Vec<ChatMessage> {
        let documents = chunks
            .iter()
            .map(Chunk::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Based on these documents: [{}], answer the query: {}",
                documents, query
            )),
        ]
    }

    /// The model's answer, verbatim
    pub async fn generate(&self, query: &str, chunks: &[Chunk]) -> Result<String> {
        self.model.complete(Self::build_prompt(query, chunks)).await
    }
}
