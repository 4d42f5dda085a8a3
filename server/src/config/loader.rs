//! Configuration loading utilities.
//!
//! The file is optional. Whatever it contains, environment variables with the
//! names used by the container deployment take precedence.

use alloc::sync::Arc;
use core::str::FromStr;
use std::{env, path::Path};

use eyre::WrapErr as _;
use secrecy::SecretString;
use tokio::fs;
use tracing::info;

use crate::config::VaultConfig;

/// Reads the config from a TOML file (when it exists) and applies the process environment.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed, or if an
/// environment override has an unparsable value.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<VaultConfig> {
    let path_ref = path.as_ref();
    let mut config = if fs::try_exists(path_ref).await.unwrap_or(false) {
        let content = fs::read_to_string(path_ref).await.wrap_err(format!(
            "Failed to read config file at: {}",
            path_ref.display()
        ))?;
        toml::from_str(&content).wrap_err(format!(
            "Failed to parse config as TOML at: {}",
            path_ref.display()
        ))?
    } else {
        info!(path = ?path_ref, "No config file, using defaults and environment");
        VaultConfig::default()
    };
    apply_env(&mut config, |key| env::var(key).ok())?;
    Ok(config)
}

/// Overrides config values with the given variables. Empty values count as unset.
///
/// # Errors
///
/// Returns an error if a numeric variable does not parse.
pub fn apply_env<F>(config: &mut VaultConfig, lookup: F) -> eyre::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let secret = |key: &str| var(key).map(|value| Arc::new(SecretString::from(value)));

    if let Some(origins) = var("CORS_ORIGINS") {
        config.server.cors_origins = parse_list(&origins)
            .wrap_err("CORS_ORIGINS must be a JSON list or a comma separated list")?;
    }
    if let Some(path) = var("DATABASE_PATH") {
        config.database.path = path;
    }

    if let Some(value) = secret("JWT_SECRET") {
        config.auth.jwt_secret = Some(value);
    }
    if let Some(value) = var("JWT_ALGORITHM") {
        config.auth.jwt_algorithm = value;
    }

    if let Some(value) = secret("OPENAI_API_KEY") {
        config.openai.api_key = Some(value);
    }
    if let Some(value) = var("OPENAI_BASE_URL") {
        config.openai.base_url = value;
    }
    if let Some(value) = var("EMBEDDING_MODEL") {
        config.openai.embedding_model = value;
    }
    if let Some(value) = var("CHAT_MODEL") {
        config.openai.chat_model = value;
    }

    if let Some(value) = secret("PINECONE_API_KEY") {
        config.pinecone.api_key = Some(value);
    }
    if let Some(value) = var("PINECONE_INDEX") {
        config.pinecone.index = Some(value);
    }
    if let Some(value) = var("PINECONE_ENVIRONMENT") {
        config.pinecone.environment = Some(value);
    }
    if let Some(value) = var("PINECONE_HOST") {
        config.pinecone.host = Some(value);
    }
    if let Some(value) = var("PINECONE_DIM") {
        config.pinecone.dimension = parse_number("PINECONE_DIM", &value)?;
    }

    if let Some(value) = var("CHUNK_SIZE") {
        config.ingest.chunk_size = parse_number("CHUNK_SIZE", &value)?;
    }
    if let Some(value) = var("CHUNK_OVERLAP") {
        config.ingest.chunk_overlap = parse_number("CHUNK_OVERLAP", &value)?;
    }
    Ok(())
}

fn parse_number<T>(key: &str, value: &str) -> eyre::Result<T>
where
    T: FromStr,
    T::Err: core::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .wrap_err(format!("{key} must be a non-negative integer, got {value:?}"))
}

fn parse_list(value: &str) -> eyre::Result<Vec<String>> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect())
}
