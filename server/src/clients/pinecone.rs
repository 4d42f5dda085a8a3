//! Pinecone REST client (control plane for index management, data plane for vectors).

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{
    ClientError, EnsureOutcome, Match, VectorIndex, VectorQuery, VectorRecord, check_status,
    http_client,
};
use crate::config::PineconeConfig;

const SERVICE: &str = "pinecone";
const API_VERSION: &str = "2025-01";

#[derive(Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    api_key: Arc<SecretString>,
    index: String,
    dimension: u32,
    control_url: String,
    cloud: String,
    region: String,
    /// Data plane base URL, resolved lazily from the control plane unless configured.
    host: Arc<OnceCell<String>>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Serialize)]
struct UpsertRequest<'req> {
    vectors: &'req [VectorRecord],
    namespace: &'req str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'req> {
    vector: &'req [f32],
    top_k: u32,
    include_metadata: bool,
    namespace: &'req str,
    filter: &'req Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

fn with_scheme(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

impl PineconeClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: &PineconeConfig,
        api_key: Arc<SecretString>,
        index: String,
    ) -> Result<Self, ClientError> {
        let host = OnceCell::new_with(config.host.as_deref().map(with_scheme));
        Ok(Self {
            http: http_client(SERVICE, Some(Duration::from_secs(config.timeout_secs)))?,
            api_key,
            index,
            dimension: config.dimension,
            control_url: config.control_url.trim_end_matches('/').to_string(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            host: Arc::new(host),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", self.api_key.expose_secret())
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        builder
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                service: SERVICE,
                source,
            })
    }

    async fn decode<R: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<R, ClientError> {
        response.json().await.map_err(|err| ClientError::Decode {
            service: SERVICE,
            reason: err.to_string(),
        })
    }

    /// `None` when the index does not exist.
    async fn describe(&self) -> Result<Option<IndexDescription>, ClientError> {
        let url = format!("{}/indexes/{}", self.control_url, self.index);
        let response = Self::send(self.authorized(self.http.get(&url))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(SERVICE, response).await?;
        Self::decode(response).await.map(Some)
    }

    async fn data_plane(&self) -> Result<&str, ClientError> {
        self.host
            .get_or_try_init(|| async {
                let description = self.describe().await?.ok_or_else(|| ClientError::Decode {
                    service: SERVICE,
                    reason: format!("index {} does not exist", self.index),
                })?;
                debug!(host = %description.host, "Resolved index host");
                Ok::<_, ClientError>(with_scheme(&description.host))
            })
            .await
            .map(String::as_str)
    }
}

#[async_trait]
impl VectorIndex for PineconeClient {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), ClientError> {
        if records.is_empty() {
            return Ok(());
        }
        let url = format!("{}/vectors/upsert", self.data_plane().await?);
        let started = tokio::time::Instant::now();
        let response = Self::send(
            self.authorized(self.http.post(&url))
                .json(&UpsertRequest {
                    vectors: records,
                    namespace,
                }),
        )
        .await?;
        check_status(SERVICE, response).await?;
        info!(
            count = records.len(),
            namespace,
            elapsed_ms = started.elapsed().as_millis(),
            "Upserted vectors"
        );
        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<Match>, ClientError> {
        let url = format!("{}/query", self.data_plane().await?);
        let response = Self::send(self.authorized(self.http.post(&url)).json(&QueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: true,
            namespace: &query.namespace,
            filter: &query.filter,
        }))
        .await?;
        let response = check_status(SERVICE, response).await?;
        let QueryResponse { matches } = Self::decode(response).await?;
        debug!(count = matches.len(), "Query returned matches");
        Ok(matches)
    }

    async fn ensure_index(&self) -> Result<EnsureOutcome, ClientError> {
        if let Some(description) = self.describe().await? {
            drop(self.host.set(with_scheme(&description.host)));
            return Ok(EnsureOutcome::AlreadyExists);
        }
        let url = format!("{}/indexes", self.control_url);
        let response = Self::send(self.authorized(self.http.post(&url)).json(&json!({
            "name": self.index,
            "dimension": self.dimension,
            "metric": "cosine",
            "spec": {"serverless": {"cloud": self.cloud, "region": self.region}},
        })))
        .await?;
        // Lost a race against another creator.
        if response.status() == StatusCode::CONFLICT {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        check_status(SERVICE, response).await?;
        Ok(EnsureOutcome::Created)
    }
}
