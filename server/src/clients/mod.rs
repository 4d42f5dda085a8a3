//! Outbound API clients: embeddings, chat completions and the vector index.
//!
//! The handlers only see the traits defined here, which keeps them testable
//! without network access.

pub mod openai;
pub mod pinecone;

use core::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

pub use openai::OpenAiClient;
pub use pinecone::PineconeClient;

pub type Embedding = Vec<f32>;

/// An upstream API call failed.
#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{service} returned an unexpected response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns one embedding per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
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

/// A chat completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Content of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ClientError>;
}

/// Metadata stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub company_id: String,
    pub team_id: String,
    pub project_id: String,
    pub user_id: String,
    pub doc_name: String,
    pub page: u32,
    pub chunk_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Embedding,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Embedding,
    pub top_k: u32,
    pub namespace: String,
    /// Metadata filter in the index's filter language.
    pub filter: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Match {
    pub id: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl Match {
    fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|meta| meta.get(key))
    }

    /// Stored chunk text.
    pub fn text(&self) -> Option<&str> {
        self.meta("text").and_then(Value::as_str)
    }

    pub fn doc_name(&self) -> Option<&str> {
        self.meta("doc_name").and_then(Value::as_str)
    }

    /// Page number; numeric metadata may come back as floats and is truncated.
    pub fn page(&self) -> Option<u64> {
        let value = self.meta("page")?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|page| page.is_finite() && *page >= 0.0)
                .map(|page| {
                    #[expect(
                        clippy::cast_possible_truncation,
                        clippy::cast_sign_loss,
                        reason = "checked non-negative and finite, fraction is dropped"
                    )]
                    let whole = page as u64;
                    whole
                })
        })
    }
}

/// Whether the index already existed before [`VectorIndex::ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// A vector index partitioned into namespaces.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), ClientError>;

    async fn query(&self, query: &VectorQuery) -> Result<Vec<Match>, ClientError>;

    /// Creates the index (cosine metric, configured dimension) unless it exists.
    async fn ensure_index(&self) -> Result<EnsureOutcome, ClientError>;
}

/// Builds the shared reqwest client.
///
/// `install_crypto_provider` must have been called first.
pub(crate) fn http_client(
    service: &'static str,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("securevault/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|source| ClientError::Transport { service, source })
}

/// Fails with [`ClientError::Status`] for non-2xx responses, keeping the body for the log.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn with_meta(meta: Value) -> Match {
        serde_json::from_value(json!({"id": "v1", "score": 0.5, "metadata": meta}))
            .expect("valid match")
    }

    #[test]
    fn page_numbers_stored_as_floats_are_read_back_as_integers() {
        assert_eq!(with_meta(json!({"page": 3.0})).page(), Some(3));
        assert_eq!(with_meta(json!({"page": 7})).page(), Some(7));
        assert_eq!(with_meta(json!({"page": -1.0})).page(), None);
        assert_eq!(with_meta(json!({"page": "two"})).page(), None);
    }

    #[test]
    fn missing_metadata_is_tolerated() {
        let bare: Match = serde_json::from_value(json!({"id": "v2"})).expect("valid match");
        assert_eq!(bare.score, None);
        assert_eq!(bare.text(), None);
        assert_eq!(bare.doc_name(), None);
        assert_eq!(bare.page(), None);
    }
}
