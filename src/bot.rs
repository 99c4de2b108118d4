/// Telegram bot module
///
/// This module sets up and runs the Telegram bot using the teloxide framework.
/// It connects all the pieces: configuration, the RAG pipeline, per-chat
/// sessions, the authorization gate and the message handler.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::{
    error_handlers::LoggingErrorHandler, prelude::*, types::Me, update_listeners::Polling,
    utils::command::BotCommands,
};
use tokio::time::sleep;

use crate::auth::{restrict_to_user, Restricted};
use crate::config::Config;
use crate::handlers::{BotHandler, Handler};
use crate::http_server::{self, AppState};
use crate::pipeline::Pipeline;
use crate::session::SessionRegistry;
use crate::transport::{ChatTransport, Inbound, TelegramTransport};
use crate::uploads::ensure_upload_dir;

/// Bot commands that users can use
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "Start the bot and see welcome message")]
    Start,
    #[command(description = "Show help information")]
    Help,
    #[command(description = "Delete the documents you uploaded")]
    Reset,
}

type Gate = Arc<Restricted<BotHandler>>;

/// Initialize and run the Telegram bot with a pre-built pipeline
pub async fn run_bot_with_pipeline(config: Config, pipeline: Arc<Pipeline>) -> Result<()> {
    log::info!("Initializing bot...");

    let sessions = Arc::new(SessionRegistry::new());

    if let Some(port) = config.health_port {
        let state = AppState {
            sessions: Arc::clone(&sessions),
            store: Arc::clone(pipeline.store()),
        };
        tokio::spawn(async move {
            if let Err(e) = http_server::start_server(state, port).await {
                log::error!("HTTP server stopped: {:?}", e);
            }
        });
    }

    log::info!("Creating HTTP client with extended timeouts (60s request, 30s connect)...");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .build()
        .context("Failed to create HTTP client")?;

    let bot = Bot::with_client(&config.telegram_token, client);

    let me = retry_get_me(&bot)
        .await
        .context("Failed to connect to Telegram API after multiple retries")?;
    log::info!("Bot started: @{}", me.username());

    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));
    let gate: Gate = Arc::new(restrict_to_user(
        config.authorized_user_id.clone(),
        BotHandler::new(pipeline, sessions, transport, config.upload_dir.clone()),
    ));
    log::info!("Only user {} is allowed to talk to the bot", config.authorized_user_id);

    // Commands, RESET, questions and uploads all go through the one gate
    let handler = dptree::entry().branch(Update::filter_message().endpoint(
        |msg: Message, me: Me, gate: Gate| async move {
            let event = Inbound::from_message(&msg, me.username());
            if let Err(e) = gate.handle(event).await {
                log::error!("Error handling message: {:?}", e);
            }
            respond(())
        },
    ));

    let listener = Polling::builder(bot.clone())
        .drop_pending_updates()
        .build();

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![gate, me.clone()])
        .enable_ctrlc_handler()
        .build();

    log::info!("Bot is running. Press Ctrl+C to stop.");

    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    Ok(())
}

/// Retry getting bot info with exponential backoff
async fn retry_get_me(bot: &Bot) -> Result<Me> {
    let max_retries = 5;
    let mut delay = Duration::from_secs(2);

    log::info!("Attempting to connect to Telegram API...");

    for attempt in 1..=max_retries {
        match bot.get_me().await {
            Ok(me) => {
                log::info!("Successfully connected to Telegram API on attempt {}", attempt);
                return Ok(me);
            }
            Err(e) if attempt == max_retries => {
                log::error!(
                    "Failed to connect to Telegram API after {} attempts. Last error: {}",
                    max_retries,
                    e
                );
                log::error!("Check the bot token, your network connection and proxy settings");
                anyhow::bail!(
                    "Failed to connect to Telegram API after {} attempts: {}",
                    max_retries,
                    e
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to connect to Telegram API (attempt {}/{}): {}\n\
                    Retrying in {:?}...",
                    attempt,
                    max_retries,
                    e,
                    delay
                );
                sleep(delay).await;
                delay *= 2;
            }
        }
    }

    unreachable!()
}

/// Initialize and run the Telegram bot (builds its own pipeline)
pub async fn run_bot(config: Config) -> Result<()> {
    ensure_upload_dir(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.upload_dir.display()))?;

    let pipeline = Arc::new(Pipeline::from_config(&config).await?);
    log::info!(
        "Pipeline ready (collection: {}, chunks: {} tokens / {} overlap)",
        pipeline.store().collection(),
        pipeline.chunker().max_tokens(),
        pipeline.chunker().overlap_tokens()
    );

    run_bot_with_pipeline(config, pipeline).await
}
