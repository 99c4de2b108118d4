//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use tg_rag_bot::auth::{restrict_to_user, Restricted};
use tg_rag_bot::chunking::{TokenChunker, TokenCounter};
use tg_rag_bot::document::{Document, PAGE_KEY};
use tg_rag_bot::embedding::Embedder;
use tg_rag_bot::error::{ParseError, PipelineError, Result};
use tg_rag_bot::handlers::BotHandler;
use tg_rag_bot::llm::{AnswerGenerator, ChatMessage, ChatModel};
use tg_rag_bot::memory::MemoryIndex;
use tg_rag_bot::parser::DocumentParser;
use tg_rag_bot::pipeline::Pipeline;
use tg_rag_bot::retriever::SearchType;
use tg_rag_bot::session::SessionRegistry;
use tg_rag_bot::store::{ScoredRecord, VectorIndex, VectorRecord, VectorStore};
use tg_rag_bot::transport::{ChatTransport, Inbound, Payload};

pub const OWNER: &str = "1001";
pub const CHAT: i64 = 77;
pub const DIMENSIONS: usize = 64;
pub const ANSWER: &str = "Revenue grew by 12% in the third quarter.";

/// One token per whitespace-separated word
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Bag-of-words vectors hashed into a fixed number of buckets
pub struct HashingEmbedder;

impl HashingEmbedder {
    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Returns a fixed answer and records every prompt it was sent
#[derive(Default)]
pub struct CountingChat {
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CountingChat {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for CountingChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages);
        Ok(ANSWER.to_string())
    }
}

/// Three pages of 400 words each; `.bin` files are unsupported and files
/// named `long*` hold one 1100-word page
pub struct PagedParser;

pub const LONG_PAGE_WORDS: usize = 1100;

pub fn long_page_text() -> String {
    (0..LONG_PAGE_WORDS)
        .map(|i| format!("term{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn page_text(page: usize) -> String {
    let topic = match page {
        1 => "revenue sales growth",
        2 => "hiring engineers expansion",
        _ => "supply chain risks",
    };
    (0..80)
        .map(|i| format!("page{page} {topic} {i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl DocumentParser for PagedParser {
    async fn parse(&self, path: &Path, display_name: &str) -> std::result::Result<Vec<Document>, ParseError> {
        if display_name.ends_with(".bin") {
            return Err(ParseError::Unsupported {
                extension: "bin".to_string(),
            });
        }
        if !path.exists() {
            return Err(ParseError::Unreadable {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        if display_name.starts_with("long") {
            return Ok(vec![Document::new(long_page_text(), display_name).with_metadata(PAGE_KEY, "1")]);
        }
        Ok((1..=3)
            .map(|page| Document::new(page_text(page), display_name).with_metadata(PAGE_KEY, page.to_string()))
            .collect())
    }
}

/// Memory index whose deletes are always rejected
#[derive(Default)]
pub struct RejectingIndex {
    inner: MemoryIndex,
}

#[async_trait]
impl VectorIndex for RejectingIndex {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        self.inner.ensure_collection(collection, dimensions).await
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        self.inner.insert(collection, records).await
    }

    async fn delete(&self, _collection: &str, _ids: &[Uuid]) -> Result<bool> {
        Ok(false)
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        self.inner.search(collection, query, limit).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }
}

/// Memory index that fails every insert
#[derive(Default)]
pub struct FailingInsertIndex {
    inner: MemoryIndex,
}

#[async_trait]
impl VectorIndex for FailingInsertIndex {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        self.inner.ensure_collection(collection, dimensions).await
    }

    async fn insert(&self, _collection: &str, _records: Vec<VectorRecord>) -> Result<()> {
        Err(PipelineError::Store("connection reset".to_string()))
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<bool> {
        self.inner.delete(collection, ids).await
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        self.inner.search(collection, query, limit).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }
}

/// Memory index that can hold the next insert open after its records
/// landed, until [`ParkingIndex::release`] is called
#[derive(Default)]
pub struct ParkingIndex {
    inner: MemoryIndex,
    park_next: AtomicBool,
    parked: Notify,
    release: Notify,
    live: Mutex<HashSet<Uuid>>,
}

impl ParkingIndex {
    pub fn park_next_insert(&self) {
        self.park_next.store(true, Ordering::SeqCst);
    }

    /// Resolves once a parked insert has stored its records
    pub async fn wait_until_parked(&self) {
        self.parked.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn live_ids(&self) -> HashSet<Uuid> {
        self.live.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for ParkingIndex {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        self.inner.ensure_collection(collection, dimensions).await
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        self.inner.insert(collection, records).await?;
        self.live.lock().unwrap().extend(ids);

        if self.park_next.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<bool> {
        let deleted = self.inner.delete(collection, ids).await?;
        let mut live = self.live.lock().unwrap();
        for id in ids {
            live.remove(id);
        }
        Ok(deleted)
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        self.inner.search(collection, query, limit).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }
}

/// Records replies; downloads write a small file unless told to fail
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(i64, String)>>,
    downloads: Mutex<Vec<PathBuf>>,
    pub fail_downloads: bool,
}

impl RecordingTransport {
    pub fn failing_downloads() -> Self {
        Self {
            fail_downloads: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn download(&self, _file_id: &str, destination: &Path) -> anyhow::Result<()> {
        if self.fail_downloads {
            anyhow::bail!("telegram file server unavailable");
        }
        tokio::fs::write(destination, b"%PDF-1.4 fake").await?;
        self.downloads.lock().unwrap().push(destination.to_path_buf());
        Ok(())
    }
}

pub async fn pipeline_with(index: Arc<dyn VectorIndex>, chat: Arc<CountingChat>) -> Pipeline {
    let chunker = TokenChunker::new(Arc::new(WordCounter), 512, 50).unwrap();
    pipeline_with_chunker(index, chat, chunker).await
}

pub async fn pipeline_with_chunker(
    index: Arc<dyn VectorIndex>,
    chat: Arc<CountingChat>,
    chunker: TokenChunker,
) -> Pipeline {
    let store = Arc::new(
        VectorStore::open(index, Arc::new(HashingEmbedder), "tg-store")
            .await
            .unwrap(),
    );
    let retriever = store.retriever(SearchType::Mmr { fetch_k: 20, lambda: 0.5 }, 5);
    Pipeline::new(
        Arc::new(PagedParser),
        chunker,
        store,
        retriever,
        AnswerGenerator::new(chat),
    )
}

pub struct Harness {
    pub gate: Restricted<BotHandler>,
    pub transport: Arc<RecordingTransport>,
    pub chat: Arc<CountingChat>,
    pub sessions: Arc<SessionRegistry>,
    pub pipeline: Arc<Pipeline>,
    pub upload_dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(Arc::new(MemoryIndex::new()), RecordingTransport::default()).await
    }

    pub async fn build(index: Arc<dyn VectorIndex>, transport: RecordingTransport) -> Self {
        let chat = Arc::new(CountingChat::default());
        let pipeline = Arc::new(pipeline_with(index, Arc::clone(&chat)).await);
        let sessions = Arc::new(SessionRegistry::new());
        let transport = Arc::new(transport);
        let upload_dir = tempfile::tempdir().unwrap();

        let handler = BotHandler::new(
            Arc::clone(&pipeline),
            Arc::clone(&sessions),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            upload_dir.path(),
        );

        Self {
            gate: restrict_to_user(OWNER, handler),
            transport,
            chat,
            sessions,
            pipeline,
            upload_dir,
        }
    }

    pub async fn tracked_ids(&self) -> Vec<Uuid> {
        self.sessions.session(CHAT).await.ids().await
    }

    pub async fn stored(&self) -> usize {
        self.pipeline.store().count().await.unwrap()
    }

    pub fn upload_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.upload_dir.path()).unwrap().next().is_none()
    }
}

pub fn from_owner(payload: Payload) -> Inbound {
    Inbound {
        chat_id: CHAT,
        sender_id: Some(OWNER.to_string()),
        payload,
    }
}

pub fn text(body: &str) -> Inbound {
    from_owner(Payload::Text(body.to_string()))
}

pub fn document(name: Option<&str>) -> Inbound {
    from_owner(Payload::Document {
        file_id: "file-1".to_string(),
        file_name: name.map(str::to_string),
    })
}
