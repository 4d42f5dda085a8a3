//! Configuration data types.
//!
//! Every section can be omitted from the file; secrets are usually supplied through
//! the environment instead (see [`crate::config::apply_env`]).

use alloc::sync::Arc;
use core::net::{IpAddr, Ipv4Addr};
use core::time::Duration;
use std::path::{Component, Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error as ThisError;

/// A configuration value is missing or unusable.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set (neither in the config file nor in the environment)")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// HTTP listener settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener. The port always comes from the CLI / `PORT`.
    pub bind: IpAddr,
    /// Requests still running after this many seconds are answered with 408.
    pub request_timeout_secs: u64,
    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            request_timeout_secs: 300,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:5173",
        "http://localhost:5174",
        "http://127.0.0.1:5173",
        "http://127.0.0.1:5174",
    ]
    .map(String::from)
    .to_vec()
}

/// `SQLite` database location.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    /// Path to the database file. Relative paths are resolved relative to the config file.
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "./securevault.db".to_string(),
        }
    }
}

/// Bearer token settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<Arc<SecretString>>,
    pub jwt_algorithm: String,
    /// Lifetime of tokens issued by `/login`.
    pub session_hours: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: "HS256".to_string(),
            session_hours: 12,
        }
    }
}

impl AuthConfig {
    /// Returns the signing secret after checking the algorithm is one we implement.
    ///
    /// # Errors
    ///
    /// Returns an error if no secret is configured or the algorithm is not `HS256`.
    pub fn signing_secret(&self) -> Result<Arc<SecretString>, ConfigError> {
        if !self.jwt_algorithm.eq_ignore_ascii_case("HS256") {
            return Err(ConfigError::Invalid {
                key: "JWT_ALGORITHM",
                reason: format!("unsupported algorithm {}, only HS256 is available", self.jwt_algorithm),
            });
        }
        self.jwt_secret.clone().ok_or(ConfigError::Missing("JWT_SECRET"))
    }
}

/// OpenAI-compatible embeddings and chat completion API.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<Arc<SecretString>>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// No timeout when omitted; embedding large batches can take a while.
    pub timeout_secs: Option<u64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            timeout_secs: None,
        }
    }
}

/// Pinecone-compatible vector index.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PineconeConfig {
    pub api_key: Option<Arc<SecretString>>,
    pub index: Option<String>,
    /// Informational only; serverless indexes are addressed by host.
    pub environment: Option<String>,
    pub dimension: u32,
    /// Data plane host of the index. Looked up through the control plane when omitted.
    pub host: Option<String>,
    pub control_url: String,
    pub timeout_secs: u64,
    pub cloud: String,
    pub region: String,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index: None,
            environment: None,
            dimension: 1536,
            host: None,
            control_url: "https://api.pinecone.io".to_string(),
            timeout_secs: 10,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// PDF ingestion tuning.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of a page.
    pub chunk_overlap: usize,
    /// Upper bound of chunks indexed per uploaded document.
    pub max_chunks: usize,
    pub embed_batch_size: usize,
    /// Time budget for extracting the text of a single page.
    pub page_timeout_secs: u64,
    /// Pages with less (trimmed) text than this are skipped.
    pub min_page_chars: usize,
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
            max_chunks: 100,
            embed_batch_size: 4,
            page_timeout_secs: 2,
            min_page_chars: 20,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl IngestConfig {
    pub const fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// # Errors
    ///
    /// Returns an error if the chunking parameters cannot make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid {
                key: "CHUNK_OVERLAP",
                reason: format!(
                    "must be smaller than the chunk size ({} >= {})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "embed_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Root config structure.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct VaultConfig {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub auth: AuthConfig,
    pub openai: OpenAiConfig,
    pub pinecone: PineconeConfig,
    pub ingest: IngestConfig,
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() || relative_path == ":memory:" {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // We can't use canonicalize() because the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}
