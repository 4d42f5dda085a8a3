//! OpenAI-compatible `/embeddings` and `/chat/completions` client.

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatModel, ClientError, Embedder, Embedding, check_status, http_client};
use crate::config::OpenAiConfig;

const SERVICE: &str = "openai";

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Arc<SecretString>,
    embedding_model: String,
    chat_model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'req> {
    model: &'req str,
    input: &'req [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Embedding,
}

#[derive(Serialize)]
struct ChatRequest<'req> {
    model: &'req str,
    messages: &'req [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &OpenAiConfig, api_key: Arc<SecretString>) -> Result<Self, ClientError> {
        Ok(Self {
            http: http_client(SERVICE, config.timeout_secs.map(Duration::from_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                service: SERVICE,
                source,
            })?;
        check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|err| ClientError::Decode {
                service: SERVICE,
                reason: err.to_string(),
            })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ClientError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = inputs.len(), model = %self.embedding_model, "Requesting embeddings");
        let mut response: EmbeddingResponse = self
            .post(
                "embeddings",
                &EmbeddingRequest {
                    model: &self.embedding_model,
                    input: inputs,
                },
            )
            .await?;

        if response.data.len() != inputs.len() {
            return Err(ClientError::Decode {
                service: SERVICE,
                reason: format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    response.data.len()
                ),
            });
        }
        response.data.sort_by_key(|item| item.index);
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ClientError> {
        let response: ChatResponse = self
            .post(
                "chat/completions",
                &ChatRequest {
                    model: &self.chat_model,
                    messages,
                },
            )
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ClientError::Decode {
                service: SERVICE,
                reason: "response contained no choices".to_string(),
            })
    }
}
