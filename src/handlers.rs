/// Message handlers module
///
/// This module handles:
/// - Routing an inbound event to reset, query, upload or help
/// - Looking up the chat's session
/// - Turning pipeline outcomes into replies
///
/// It talks to the chat only through [`ChatTransport`], so the whole flow
/// can be driven without Telegram.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;

use crate::bot::Command;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, QueryOutcome, ResetOutcome};
use crate::session::SessionRegistry;
use crate::transport::{ChatTransport, Inbound, Payload};
use crate::uploads::UploadGuard;

/// Text prefix that wipes the chat's documents
pub const RESET_TOKEN: &str = "RESET";

/// Characters of the first chunk shown after an upload
pub const PREVIEW_CHARS: usize = 100;

pub const NO_DOCUMENTS_REPLY: &str = "No relevant documents found for your query.";
pub const RESET_OK_REPLY: &str = "Vector store reset successfully.";
pub const RESET_FAILED_REPLY: &str = "Failed to reset the vector store.";

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: Inbound) -> Result<()>;
}

pub struct BotHandler {
    pipeline: Arc<Pipeline>,
    sessions: Arc<SessionRegistry>,
    transport: Arc<dyn ChatTransport>,
    upload_dir: PathBuf,
}

impl BotHandler {
    pub fn new(
        pipeline: Arc<Pipeline>,
        sessions: Arc<SessionRegistry>,
        transport: Arc<dyn ChatTransport>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            transport,
            upload_dir: upload_dir.into(),
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.transport.send_text(chat_id, text).await
    }

    /// Handle the RESET token and the /reset command
    async fn handle_reset(&self, chat_id: i64) -> Result<()> {
        log::info!("Resetting the vector store for chat {}...", chat_id);
        let session = self.sessions.session(chat_id).await;

        match self.pipeline.reset(&session).await {
            Ok(ResetOutcome::Cleared { removed }) => {
                log::info!("Vector store reset successfully ({} records removed)", removed);
                self.reply(chat_id, RESET_OK_REPLY).await
            }
            Ok(ResetOutcome::Failed) => {
                log::error!("Failed to reset the vector store for chat {}", chat_id);
                self.reply(chat_id, RESET_FAILED_REPLY).await
            }
            Err(e) => {
                log::error!("Error while resetting the vector store: {}", e);
                self.reply(chat_id, "An error occurred while resetting the vector store.")
                    .await
            }
        }
    }

    /// Answer a question from the indexed documents
    async fn handle_text_message(&self, chat_id: i64, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return self.reply(chat_id, "Please send a valid text message.").await;
        }

        if let Err(e) = self.transport.send_typing(chat_id).await {
            log::debug!("Could not send typing action: {}", e);
        }

        match self.pipeline.query(text).await {
            Ok(QueryOutcome::NoDocuments) => self.reply(chat_id, NO_DOCUMENTS_REPLY).await,
            Ok(QueryOutcome::Answer(answer)) => {
                self.reply(chat_id, &format!("LLM's response: {}", answer)).await
            }
            Err(PipelineError::EmptyQuery) => {
                self.reply(chat_id, "Please send a valid text message.").await
            }
            Err(e) => {
                log::error!("Error while processing user query: {}, Error: {}", text, e);
                self.reply(
                    chat_id,
                    "Sorry, I encountered an error while processing your query. Please try again.",
                )
                .await
            }
        }
    }

    /// Download, ingest and preview an uploaded document
    async fn handle_file_upload(&self, chat_id: i64, file_id: &str, file_name: Option<&str>) -> Result<()> {
        let guard = match file_name.map(|name| UploadGuard::reserve(&self.upload_dir, name)) {
            Some(Ok(guard)) => guard,
            _ => {
                log::warn!("Received a file without a name.");
                return self.reply(chat_id, "File name is missing.").await;
            }
        };
        let name = guard.display_name().to_string();

        log::info!("Received file: {}", name);
        self.reply(chat_id, &format!("File '{}' received. Processing...", name))
            .await?;

        if let Err(e) = self.transport.download(file_id, guard.path()).await {
            log::error!("Error while downloading file: {}, Error: {:?}", name, e);
            return self
                .reply(chat_id, "An error occurred while downloading the file. Please try again.")
                .await;
        }

        let session = self.sessions.session(chat_id).await;
        let result = self.pipeline.ingest(guard.path(), &name, &session).await;

        // Early returns above rely on the guard's Drop instead
        guard.remove().await;

        match result {
            Ok(batch) => {
                log::info!("Documents added to vector store: {} chunks from {}", batch.len(), name);
                let preview = batch
                    .first()
                    .map(|(id, chunk)| format!("- {}: {}...", id, chunk.preview(PREVIEW_CHARS)))
                    .unwrap_or_default();
                self.reply(
                    chat_id,
                    &format!("File processed successfully! Here's a preview:\n{}", preview),
                )
                .await
            }
            Err(e) if e.is_input_error() => {
                log::warn!("Rejected file {}: {}", name, e);
                self.reply(chat_id, &format!("Could not process '{}': {}", name, e))
                    .await
            }
            Err(e) => {
                log::error!("Error while processing file: {}, Error: {}", name, e);
                self.reply(chat_id, "An error occurred while processing the file. Please try again.")
                    .await
            }
        }
    }

    async fn handle_start_command(&self, chat_id: i64) -> Result<()> {
        let welcome_message = "👋 Hello! Send me a document (PDF, Markdown or plain text) \
            and I'll index it.\n\n\
            Then ask me anything about it and I'll answer from the indexed content.\n\n\
            Send RESET or /reset to remove the documents you uploaded.";
        self.reply(chat_id, welcome_message).await
    }

    async fn handle_help_command(&self, chat_id: i64) -> Result<()> {
        let help_message = format!(
            "{}\n\n\
            How I work:\n\
            • Upload a file and I split it into chunks and store their embeddings\n\
            • Ask a question and I retrieve the most relevant chunks\n\
            • The chunks and your question go to the language model for an answer\n\
            • RESET (or /reset) deletes everything uploaded since the last reset",
            Command::descriptions()
        );
        self.reply(chat_id, &help_message).await
    }
}

#[async_trait]
impl Handler for BotHandler {
    async fn handle(&self, event: Inbound) -> Result<()> {
        let chat_id = event.chat_id;
        log::debug!("Received {:?} in chat {}", event.payload, chat_id);

        match event.payload {
            Payload::Command(Command::Start) => self.handle_start_command(chat_id).await,
            Payload::Command(Command::Help) => self.handle_help_command(chat_id).await,
            Payload::Command(Command::Reset) => self.handle_reset(chat_id).await,
            Payload::Text(text) if text.starts_with(RESET_TOKEN) => self.handle_reset(chat_id).await,
            Payload::Text(text) => self.handle_text_message(chat_id, &text).await,
            Payload::Document { file_id, file_name } => {
                self.handle_file_upload(chat_id, &file_id, file_name.as_deref())
                    .await
            }
            Payload::Other => self.reply(chat_id, "Please send a valid text message.").await,
        }
    }
}
