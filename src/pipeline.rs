/// Ingestion, query and reset pipelines
///
/// This module handles:
/// - Parsing an uploaded file, chunking it and indexing the chunks
/// - Retrieving chunks for a question and asking the chat model
/// - Deleting everything a session inserted
///
/// Nothing here knows about Telegram; the dispatcher passes in paths, text
/// and the chat's [`Session`].

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::chunking::TokenChunker;
use crate::config::{Config, VectorBackend};
use crate::document::Chunk;
use crate::embedding::OpenAiEmbedder;
use crate::error::{ParseError, PipelineError, Result};
use crate::llm::{AnswerGenerator, ChatModel, OpenAiChat};
use crate::memory::MemoryIndex;
use crate::parser::{DocumentParser, FileParser};
use crate::pgvector::PgVectorIndex;
use crate::retriever::Retriever;
use crate::session::Session;
use crate::store::{VectorIndex, VectorStore};

/// Chunks inserted by one upload, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedBatch {
    pub entries: Vec<(Uuid, Chunk)>,
}

impl IngestedBatch {
    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn first(&self) -> Option<&(Uuid, Chunk)> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The retriever returned nothing; the model was not called
    NoDocuments,
    Answer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Cleared { removed: usize },
    /// Nothing tracked, or the store rejected the delete; session unchanged
    Failed,
}

pub struct Pipeline {
    parser: Arc<dyn DocumentParser>,
    chunker: TokenChunker,
    store: Arc<VectorStore>,
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl Pipeline {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        chunker: TokenChunker,
        store: Arc<VectorStore>,
        retriever: Retriever,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            parser,
            chunker,
            store,
            retriever,
            generator,
        }
    }

    /// Build the production pipeline: file parser, cl100k chunker, OpenAI
    /// embeddings and chat, and the configured vector backend
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let index: Arc<dyn VectorIndex> = match &config.vector_backend {
            VectorBackend::Postgres { database_url } => Arc::new(
                PgVectorIndex::connect(database_url)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            ),
            VectorBackend::Memory => {
                log::warn!("Using in-memory vector index; documents are lost on restart");
                Arc::new(MemoryIndex::new())
            }
        };

        let embedder = Arc::new(OpenAiEmbedder::new(
            http_client.clone(),
            &config.embedding_api_base_url,
            &config.embedding_api_key,
            &config.embedding_model,
            config.embedding_dimensions,
        ));

        let store = Arc::new(
            VectorStore::open(index, embedder, &config.collection_name)
                .await
                .context("Failed to initialize the vector collection")?,
        );

        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(
            http_client,
            &config.openai_api_base_url,
            &config.openai_api_key,
            &config.model_name,
        ));

        let chunker = TokenChunker::cl100k(config.chunk_max_tokens, config.chunk_overlap_tokens)
            .context("Failed to load the cl100k_base tokenizer")?;

        Ok(Self::new(
            Arc::new(FileParser::new()),
            chunker,
            Arc::clone(&store),
            store.retriever(config.search_type, config.retriever_k),
            AnswerGenerator::new(chat),
        ))
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn chunker(&self) -> &TokenChunker {
        &self.chunker
    }

    /// Parse, chunk and index the file at `path`, recording the new ids in `session`
    pub async fn ingest(&self, path: &Path, display_name: &str, session: &Session) -> Result<IngestedBatch> {
        if display_name.trim().is_empty() {
            return Err(PipelineError::MissingFileName);
        }

        log::info!("Parsing file: {}", path.display());
        let documents = self.parser.parse(path, display_name).await?;
        log::info!("File parsed successfully: {} ({} documents)", display_name, documents.len());

        let chunks = self.chunker.chunk_documents(&documents);
        if chunks.is_empty() {
            return Err(ParseError::Empty.into());
        }
        log::info!("Split into {} chunks", chunks.len());

        let ids: Vec<Uuid> = chunks.iter().map(|_| Uuid::new_v4()).collect();

        {
            let mut tracked = session.lock().await;
            self.store.insert_batch(&ids, &chunks).await?;
            tracked.extend(ids.iter().copied());
        }

        Ok(IngestedBatch {
            entries: ids.into_iter().zip(chunks).collect(),
        })
    }

    /// Answer `text` from the indexed chunks
    pub async fn query(&self, text: &str) -> Result<QueryOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        log::info!("Retrieving documents for user query: {}", text);
        let chunks = self.retriever.retrieve(text).await?;
        if chunks.is_empty() {
            return Ok(QueryOutcome::NoDocuments);
        }

        log::info!("Asking the LLM about {} retrieved chunks...", chunks.len());
        let answer = self.generator.generate(text, &chunks).await?;
        Ok(QueryOutcome::Answer(answer))
    }

    /// Delete every record `session` inserted since its last reset
    pub async fn reset(&self, session: &Session) -> Result<ResetOutcome> {
        let mut tracked = session.lock().await;
        if tracked.is_empty() {
            return Ok(ResetOutcome::Failed);
        }

        if self.store.delete_batch(&tracked).await? {
            let removed = tracked.len();
            tracked.clear();
            Ok(ResetOutcome::Cleared { removed })
        } else {
            Ok(ResetOutcome::Failed)
        }
    }
}
