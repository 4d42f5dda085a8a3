//! In-memory doubles for the database and the upstream APIs.

use alloc::sync::Arc;
use core::time::Duration;
use std::{path::Path, sync::Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use secrecy::SecretString;
use serde_json::{Map, Value, json};

use crate::{
    app::{AppState, Role, Scope, db},
    clients::{
        ChatMessage, ChatModel, ClientError, Embedder, Embedding, EnsureOutcome, Match,
        VectorIndex, VectorQuery, VectorRecord,
    },
    config::VaultConfig,
    http::auth::{Claims, JwtKeys},
};

pub(crate) const TEST_SECRET: &str = "test-secret";

pub(crate) async fn memory_db() -> db::DbPool {
    db::init(Path::new(":memory:")).await.expect("in-memory db")
}

pub(crate) fn scope() -> Scope {
    Scope {
        company_id: "acme".to_string(),
        team_id: "research".to_string(),
        project_id: "apollo".to_string(),
    }
}

fn upstream_failure(service: &'static str) -> ClientError {
    ClientError::Decode {
        service,
        reason: "injected failure".to_string(),
    }
}

/// Embeds every input as `[len, 1.0]`.
#[derive(Default)]
pub(crate) struct FakeEmbedder {
    fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeEmbedder {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Answers only after `delay`.
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ClientError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(upstream_failure("embeddings"));
        }
        self.calls.lock().expect("lock").push(inputs.to_vec());
        #[expect(clippy::cast_precision_loss, reason = "test vectors")]
        let vectors = inputs
            .iter()
            .map(|input| vec![input.len() as f32, 1.0])
            .collect();
        Ok(vectors)
    }
}

/// Records upserts and queries, answers queries with preset matches.
#[derive(Default)]
pub(crate) struct FakeIndex {
    upserts: Mutex<Vec<(String, Vec<VectorRecord>)>>,
    queries: Mutex<Vec<VectorQuery>>,
    matches: Mutex<Vec<Match>>,
    fail_queries: Mutex<bool>,
}

impl FakeIndex {
    pub(crate) fn upserts(&self) -> Vec<(String, Vec<VectorRecord>)> {
        self.upserts.lock().expect("lock").clone()
    }

    pub(crate) fn queries(&self) -> Vec<VectorQuery> {
        self.queries.lock().expect("lock").clone()
    }

    pub(crate) fn set_matches(&self, matches: Vec<Match>) {
        *self.matches.lock().expect("lock") = matches;
    }

    pub(crate) fn fail_queries(&self) {
        *self.fail_queries.lock().expect("lock") = true;
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<(), ClientError> {
        self.upserts
            .lock()
            .expect("lock")
            .push((namespace.to_string(), records.to_vec()));
        Ok(())
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<Match>, ClientError> {
        self.queries.lock().expect("lock").push(query.clone());
        if *self.fail_queries.lock().expect("lock") {
            return Err(upstream_failure("vector index"));
        }
        Ok(self.matches.lock().expect("lock").clone())
    }

    async fn ensure_index(&self) -> Result<EnsureOutcome, ClientError> {
        Ok(EnsureOutcome::AlreadyExists)
    }
}

/// Answers every prompt with a fixed text and remembers the prompts.
pub(crate) struct FakeChat {
    answer: String,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl Default for FakeChat {
    fn default() -> Self {
        Self {
            answer: "The answer is 42.".to_string(),
            prompts: Mutex::default(),
        }
    }
}

impl FakeChat {
    pub(crate) fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ClientError> {
        self.prompts.lock().expect("lock").push(messages.to_vec());
        Ok(self.answer.clone())
    }
}

pub(crate) fn test_config() -> VaultConfig {
    let mut config = VaultConfig::default();
    config.auth.jwt_secret = Some(Arc::new(SecretString::from(TEST_SECRET)));
    config.database.path = ":memory:".to_string();
    config.ingest.min_page_chars = 5;
    config
}

/// Router state wired to in-memory doubles, plus handles to inspect them.
pub(crate) struct TestApp {
    pub state: AppState,
    pub embedder: Arc<FakeEmbedder>,
    pub index: Arc<FakeIndex>,
    pub chat: Arc<FakeChat>,
}

impl TestApp {
    pub(crate) async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub(crate) async fn with_config(config: VaultConfig) -> Self {
        Self::with_embedder(config, FakeEmbedder::default()).await
    }

    pub(crate) async fn with_embedder(config: VaultConfig, embedder: FakeEmbedder) -> Self {
        let embedder = Arc::new(embedder);
        let index = Arc::new(FakeIndex::default());
        let chat = Arc::new(FakeChat::default());
        let jwt = Arc::new(JwtKeys::new(
            config.auth.signing_secret().expect("test secret"),
        ));
        let state = AppState {
            config: Arc::new(config),
            db_pool: memory_db().await,
            jwt,
            embedder: embedder.clone(),
            chat: chat.clone(),
            index: index.clone(),
        };
        Self {
            state,
            embedder,
            index,
            chat,
        }
    }

    /// Bearer token for `user_id` with a single role.
    pub(crate) fn token(&self, user_id: &str, scope: Option<&Scope>, role: Role) -> String {
        let claims = Claims {
            user_id: Some(user_id.to_string()),
            company_id: scope.map(|s| s.company_id.clone()),
            team_id: scope.map(|s| s.team_id.clone()),
            project_id: scope.map(|s| s.project_id.clone()),
            roles: vec![role.to_string()],
            exp: Some((Utc::now() + TimeDelta::hours(1)).timestamp()),
        };
        self.state.jwt.issue(&claims).expect("token")
    }

    pub(crate) fn chunk_match(id: &str, text: &str, page: u32) -> Match {
        let mut metadata = Map::new();
        metadata.insert("doc_name".to_string(), json!("report.pdf"));
        metadata.insert("page".to_string(), json!(f64::from(page)));
        metadata.insert("text".to_string(), Value::String(text.to_string()));
        Match {
            id: id.to_string(),
            score: Some(0.75),
            metadata: Some(metadata),
        }
    }
}
