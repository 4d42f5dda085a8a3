use alloc::sync::Arc;
use std::path::Path;

use eyre::WrapErr as _;
use tracing::info;

use crate::{
    app::db::{self, DbPool},
    clients::{ChatModel, Embedder, OpenAiClient, PineconeClient, VectorIndex},
    config::{ConfigError, VaultConfig, resolve_config_relative_paths},
    http::auth::JwtKeys,
};

/// Application state shared across request handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Effective configuration after file, environment and CLI overrides.
    pub config: Arc<VaultConfig>,

    pub db_pool: DbPool,

    /// Signs and verifies bearer tokens.
    pub jwt: Arc<JwtKeys>,

    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub index: Arc<dyn VectorIndex>,
}

/// Open the database named in the config, relative to the config file.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_database(
    config: &VaultConfig,
    config_path: &Path,
) -> eyre::Result<DbPool> {
    let db_path = resolve_config_relative_paths(config_path, &config.database.path);
    let pool = db::init(&db_path).await.wrap_err(format!(
        "Failed to initialize database at: {}",
        db_path.display()
    ))?;
    info!(
        "Database initialized at: {} (note: WAL mode creates .db-wal and .db-shm files alongside)",
        db_path.display()
    );
    Ok(pool)
}

/// Builds the Pinecone client from the config.
///
/// # Errors
///
/// Returns an error if the API key or index name is missing.
pub(super) fn pinecone_client(config: &VaultConfig) -> eyre::Result<PineconeClient> {
    let api_key = config
        .pinecone
        .api_key
        .clone()
        .ok_or(ConfigError::Missing("PINECONE_API_KEY"))?;
    let index = config
        .pinecone
        .index
        .clone()
        .ok_or(ConfigError::Missing("PINECONE_INDEX"))?;
    Ok(PineconeClient::new(&config.pinecone, api_key, index)?)
}

/// Validate the config, open the database and construct the API clients.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_state(
    config: VaultConfig,
    config_path: &Path,
) -> eyre::Result<AppState> {
    config.ingest.validate()?;
    let jwt = Arc::new(JwtKeys::new(config.auth.signing_secret()?));

    let openai_key = config
        .openai
        .api_key
        .clone()
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let openai = Arc::new(OpenAiClient::new(&config.openai, openai_key)?);
    let index = Arc::new(pinecone_client(&config)?);

    if let Some(ref environment) = config.pinecone.environment {
        info!(environment, "Pinecone environment configured (informational)");
    }

    let db_pool = initialize_database(&config, config_path).await?;

    Ok(AppState {
        config: Arc::new(config),
        db_pool,
        jwt,
        embedder: openai.clone(),
        chat: openai,
        index,
    })
}
