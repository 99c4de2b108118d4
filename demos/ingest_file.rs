/// Example: Ingesting a local file and asking about it
///
/// This demonstrates:
/// 1. Building the pipeline from the environment
/// 2. Parsing, chunking and indexing one file
/// 3. Asking a question against the indexed chunks
/// 4. Resetting the session afterwards
///
/// Run with: cargo run --example ingest_file -- path/to/notes.pdf "What is this about?"

use tg_rag_bot::{
    config::Config,
    handlers::PREVIEW_CHARS,
    pipeline::{Pipeline, QueryOutcome, ResetOutcome},
    session::Session,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => std::path::PathBuf::from(path),
        None => anyhow::bail!("usage: ingest_file <file> [question]"),
    };
    let question = args
        .next()
        .unwrap_or_else(|| "Summarize this document.".to_string());

    println!("🚀 Initializing pipeline...\n");

    let config = Config::from_env()?;
    config.check()?;
    println!("✅ Configuration loaded");

    let pipeline = Pipeline::from_config(&config).await?;
    println!("✅ Pipeline ready (collection: {})\n", pipeline.store().collection());

    let display_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let session = Session::new();

    println!("📄 Ingesting {}...", display_name);
    let batch = pipeline.ingest(&path, &display_name, &session).await?;
    println!("   ✓ Added {} chunks", batch.len());
    if let Some((id, chunk)) = batch.first() {
        println!("   Preview:\n   - {}: {}...\n", id, chunk.preview(PREVIEW_CHARS));
    }

    println!("🔍 Query: {}", question);
    match pipeline.query(&question).await? {
        QueryOutcome::NoDocuments => println!("   No relevant documents found\n"),
        QueryOutcome::Answer(answer) => println!("   {}\n", answer),
    }

    match pipeline.reset(&session).await? {
        ResetOutcome::Cleared { removed } => println!("🧹 Removed {} records", removed),
        ResetOutcome::Failed => println!("⚠ Reset failed; records stay in the collection"),
    }

    Ok(())
}
