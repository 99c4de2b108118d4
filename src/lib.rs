/// Telegram RAG Bot Library
///
/// This library provides the core functionality of a single-user Telegram
/// bot that indexes uploaded documents and answers questions about them
/// with RAG (Retrieval-Augmented Generation): parsing, token chunking,
/// vector storage, MMR retrieval, answer generation, per-chat sessions and
/// the bot setup itself.

pub mod auth;
pub mod bot;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod http_server;
pub mod llm;
pub mod memory;
pub mod parser;
pub mod pgvector;
pub mod pipeline;
pub mod retriever;
pub mod session;
pub mod store;
pub mod transport;
pub mod uploads;
