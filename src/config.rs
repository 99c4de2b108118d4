/// Configuration module for managing environment variables and API keys
///
/// This module loads and validates all required configuration values from
/// environment variables (typically from a .env file). Everything the bot
/// needs is checked once at startup so a missing credential stops the
/// process instead of failing the first query.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use crate::retriever::SearchType;

/// Where vector records are persisted
#[derive(Debug, Clone, PartialEq)]
pub enum VectorBackend {
    /// PostgreSQL with the pgvector extension
    Postgres { database_url: String },
    /// In-process index, lost on restart
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token from BotFather
    pub telegram_token: String,

    /// The only Telegram user id allowed to talk to the bot
    pub authorized_user_id: String,

    /// Base URL of the OpenAI-compatible chat-completion endpoint
    pub openai_api_base_url: String,

    /// API key for the chat-completion endpoint
    pub openai_api_key: String,

    /// Chat model used to answer queries (e.g. "qwen2-7b-instruct")
    pub model_name: String,

    /// Name of the vector collection (table) holding the chunks
    pub collection_name: String,

    pub vector_backend: VectorBackend,

    /// Base URL of the OpenAI-compatible embeddings endpoint
    pub embedding_api_base_url: String,

    pub embedding_api_key: String,

    /// Embedding model to use (e.g. "text-embedding-3-large")
    pub embedding_model: String,

    /// Vector dimensionality of the collection and of requested embeddings
    pub embedding_dimensions: usize,

    /// Token budget per chunk
    pub chunk_max_tokens: usize,

    /// Tokens shared by consecutive chunks of one document
    pub chunk_overlap_tokens: usize,

    /// Search strategy used by the retriever
    pub search_type: SearchType,

    /// Number of chunks handed to the LLM
    pub retriever_k: usize,

    /// Directory where uploaded files are staged while being processed
    pub upload_dir: PathBuf,

    /// Port for the health HTTP server; no server when unset
    pub health_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any required environment variable is missing
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let telegram_token = required("TELEGRAM_BOT_TOKEN")?;
        let authorized_user_id = required("AUTHORIZED_USER_ID")?.trim().to_string();
        let openai_api_base_url = required("OPENAI_API_BASE_URL")?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        let vector_backend = match or_default("VECTOR_BACKEND", "postgres").to_lowercase().as_str() {
            "postgres" | "pgvector" => VectorBackend::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            "memory" => VectorBackend::Memory,
            other => bail!("VECTOR_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let retriever_k = parse_or(&lookup, "RETRIEVER_K", 5usize)?;
        let search_type = match or_default("SEARCH_TYPE", "mmr").to_lowercase().as_str() {
            "mmr" => SearchType::Mmr {
                fetch_k: parse_or(&lookup, "MMR_FETCH_K", 20usize)?,
                lambda: parse_or(&lookup, "MMR_LAMBDA", 0.5f32)?,
            },
            "similarity" => SearchType::Similarity,
            "similarity_score_threshold" => SearchType::SimilarityScoreThreshold {
                threshold: parse_or(&lookup, "SCORE_THRESHOLD", 0.5f32)?,
            },
            other => bail!(
                "SEARCH_TYPE must be one of 'mmr', 'similarity', 'similarity_score_threshold', got '{}'",
                other
            ),
        };

        Ok(Config {
            embedding_api_base_url: lookup("EMBEDDING_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| openai_api_base_url.clone()),
            embedding_api_key: lookup("EMBEDDING_API_KEY")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| openai_api_key.clone()),
            telegram_token,
            authorized_user_id,
            openai_api_base_url,
            openai_api_key,
            model_name: or_default("MODEL_NAME", "qwen2-7b-instruct"),
            collection_name: or_default("COLLECTION_NAME", "tg-store"),
            vector_backend,
            embedding_model: or_default("EMBEDDING_MODEL", "text-embedding-3-large"),
            embedding_dimensions: parse_or(&lookup, "EMBEDDING_DIMENSIONS", 1024usize)?,
            chunk_max_tokens: parse_or(&lookup, "CHUNK_MAX_TOKENS", 512usize)?,
            chunk_overlap_tokens: parse_or(&lookup, "CHUNK_OVERLAP_TOKENS", 50usize)?,
            search_type,
            retriever_k,
            upload_dir: PathBuf::from(or_default("UPLOAD_DIR", "uploads")),
            health_port: match lookup("HEALTH_PORT").filter(|v| !v.trim().is_empty()) {
                Some(v) => Some(
                    v.trim()
                        .parse()
                        .with_context(|| format!("HEALTH_PORT is not a valid port: {}", v))?,
                ),
                None => None,
            },
        })
    }

    /// Check value ranges that cannot be expressed by parsing alone
    pub fn check(&self) -> Result<()> {
        if self.chunk_max_tokens == 0 {
            bail!("CHUNK_MAX_TOKENS must be greater than zero");
        }
        if self.chunk_overlap_tokens >= self.chunk_max_tokens {
            bail!(
                "CHUNK_OVERLAP_TOKENS ({}) must be smaller than CHUNK_MAX_TOKENS ({})",
                self.chunk_overlap_tokens,
                self.chunk_max_tokens
            );
        }
        if self.embedding_dimensions == 0 {
            bail!("EMBEDDING_DIMENSIONS must be greater than zero");
        }
        if self.retriever_k == 0 {
            bail!("RETRIEVER_K must be greater than zero");
        }
        match self.search_type {
            SearchType::Mmr { fetch_k, lambda } => {
                if fetch_k < self.retriever_k {
                    bail!("MMR_FETCH_K ({}) must be at least RETRIEVER_K ({})", fetch_k, self.retriever_k);
                }
                if !(0.0..=1.0).contains(&lambda) {
                    bail!("MMR_LAMBDA must be within [0, 1], got {}", lambda);
                }
            }
            SearchType::SimilarityScoreThreshold { threshold } => {
                if !(-1.0..=1.0).contains(&threshold) {
                    bail!("SCORE_THRESHOLD must be within [-1, 1], got {}", threshold);
                }
            }
            SearchType::Similarity => {}
        }
        Ok(())
    }

    /// Validate that all required services are accessible
    pub async fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        self.check()?;

        if let VectorBackend::Postgres { database_url } = &self.vector_backend {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await
                .context("Failed to connect to PostgreSQL database")?;

            sqlx::query("SELECT 1")
                .fetch_one(&pool)
                .await
                .context("Database connection test query failed")?;

            pool.close().await;
        }

        log::info!("Configuration validated successfully");
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
