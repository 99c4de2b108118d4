/// Error types for the ingestion, query and reset pipelines
///
/// Configuration problems are reported through `anyhow` at startup (see
/// `config`); everything that can go wrong while handling a single message
/// lands in [`PipelineError`].

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a [`DocumentParser`](crate::parser::DocumentParser)
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported file format: {extension}")]
    Unsupported { extension: String },

    #[error("could not read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("document contains no extractable text")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("file name is missing")]
    MissingFileName,

    #[error("query text is empty")]
    EmptyQuery,

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("chat completion failed: {0}")]
    Completion(String),
}

impl PipelineError {
    /// Input errors are the caller's fault and never touch the store
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Parse(_) | PipelineError::MissingFileName | PipelineError::EmptyQuery
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
