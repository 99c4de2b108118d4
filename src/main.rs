/// Telegram RAG Bot
///
/// A Telegram bot that answers questions about the documents its single
/// authorized user uploads.
///
/// The bot:
/// - Parses PDF, Markdown and plain-text uploads and splits them into token chunks
/// - Stores chunk embeddings in PostgreSQL with pgvector
/// - Retrieves relevant chunks with maximal marginal relevance
/// - Generates answers with an OpenAI-compatible chat model
/// - Deletes everything a chat uploaded when it sends RESET

use anyhow::Result;
use tg_rag_bot::{bot, config};

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the logger
    dotenv::dotenv().ok();

    // Initialize logger, defaulting to info
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    log::info!("Starting Telegram RAG bot...");

    // Load configuration from environment
    let cfg = config::Config::from_env()?;

    // Validate configuration and connections
    cfg.validate().await?;

    // Run the bot
    bot::run_bot(cfg).await?;

    Ok(())
}
