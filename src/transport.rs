/// Messaging transport
///
/// The dispatcher only sees [`Inbound`] events and a [`ChatTransport`] for
/// replies and downloads. [`TelegramTransport`] is the teloxide-backed
/// implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use teloxide::utils::command::BotCommands;

use crate::bot::Command;

/// Telegram rejects longer messages
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// An inbound message reduced to what the bot acts on
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub chat_id: i64,
    /// Sender's user id as a string; `None` for channel posts and the like
    pub sender_id: Option<String>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Command(Command),
    Text(String),
    Document {
        file_id: String,
        file_name: Option<String>,
    },
    /// Stickers, photos and anything else without text or a document
    Other,
}

impl Inbound {
    pub fn from_message(msg: &Message, bot_username: &str) -> Self {
        let payload = if let Some(doc) = msg.document() {
            Payload::Document {
                file_id: doc.file.id.clone(),
                file_name: doc.file_name.clone(),
            }
        } else if let Some(text) = msg.text() {
            match Command::parse(text, bot_username) {
                Ok(cmd) => Payload::Command(cmd),
                Err(_) => Payload::Text(text.to_string()),
            }
        } else {
            Payload::Other
        };

        Self {
            chat_id: msg.chat.id.0,
            sender_id: msg.from().map(|user| user.id.0.to_string()),
            payload,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Save the file identified by `file_id` at `destination`
    async fn download(&self, file_id: &str, destination: &Path) -> Result<()>;

    /// Show a "typing" indicator while a slow operation runs
    async fn send_typing(&self, _chat_id: i64) -> Result<()> {
        Ok(())
    }
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            self.bot
                .send_message(ChatId(chat_id), part)
                .await
                .context("Failed to send message")?;
        }
        Ok(())
    }

    async fn download(&self, file_id: &str, destination: &Path) -> Result<()> {
        let file = self
            .bot
            .get_file(file_id)
            .await
            .context("Failed to look up file")?;

        let mut dst = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .context("Failed to download file")?;

        log::debug!("Downloaded {} to {}", file_id, destination.display());
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await?;
        Ok(())
    }
}

/// Split `text` into parts of at most `max_chars` characters, preferring
/// line breaks as cut points
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                parts.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
