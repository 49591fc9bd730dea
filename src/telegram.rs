//! Telegram Bot integration for Club Kdrama
//!
//! Thin adapter between teloxide and the conversation controller:
//! - Converts incoming messages into [`InboundMessage`]s
//! - Throttles each user with a fixed-window rate limiter
//! - Delivers [`Outbound`] replies (text, link keyboards, menu, cover media)
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{
        InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton,
        KeyboardMarkup, ReplyMarkup, Update,
    },
};
use tokio::sync::RwLock;

use crate::catalog::{CachedCatalog, SqliteCatalog};
use crate::config::Config;
use crate::controller::Controller;
use crate::message::{InboundMessage, Keyboard, Outbound};
use crate::presentation;

/// Telegram rejects messages longer than 4096 characters
const MAX_MESSAGE_CHARS: usize = 4000;

/// Open the catalog and build the controller described by `config`
pub fn build_controller(config: &Config) -> Result<Controller> {
    let catalog = SqliteCatalog::open(&config.database_path)?;
    match catalog.count() {
        Ok(count) => tracing::info!("Catalog: {} titles", count),
        Err(e) => tracing::warn!("Could not count catalog titles: {}", e),
    }

    let catalog = CachedCatalog::new(catalog, config.airing_cache_ttl);
    Ok(Controller::new(Arc::new(catalog))
        .with_query_timeout(config.query_timeout)
        .with_info_links(config.info_links.clone()))
}

/// Run Telegram bot with explicit Dispatcher for reliable polling
pub async fn run_telegram_bot(config: Config) -> Result<()> {
    tracing::info!("===========================================");
    tracing::info!("  Club Kdrama Bot - Starting...");
    tracing::info!("===========================================");
    tracing::info!("Catalog database: {:?}", config.database_path);
    tracing::info!("Catalog query timeout: {:?}", config.query_timeout);
    tracing::info!("Airing cache TTL: {:?}", config.airing_cache_ttl);

    let controller = build_controller(&config)?;

    let bot = Bot::new(config.telegram_token.clone());

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    tracing::info!("Clearing webhook (if any)...");
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let handler_data = Arc::new(BotData {
        controller,
        rate_limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
    });
    if config.rate_limit_per_minute == 0 {
        tracing::info!("Rate limiter: disabled");
    } else {
        tracing::info!("Rate limiter: {} req/min per user", config.rate_limit_per_minute);
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    tracing::info!("Starting dispatcher with long polling...");
    tracing::info!("===========================================");
    tracing::info!("  Bot is now LIVE - send /start");
    tracing::info!("===========================================");

    // Create dispatcher with explicit configuration
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![handler_data])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(bot: Bot, msg: Message, data: Arc<BotData>) -> ResponseResult<()> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
    let chat_id = msg.chat.id.0;
    let text_preview = msg
        .text()
        .unwrap_or("<non-text>")
        .chars()
        .take(50)
        .collect::<String>();

    tracing::info!(
        ">>> Message received: user={}, chat={}, text={:?}",
        user_id,
        chat_id,
        text_preview
    );

    // Failures stay scoped to this update; the dispatcher keeps running.
    if let Err(e) = handle_message(&bot, &msg, &data).await {
        tracing::error!("Error handling message: {}", e);
    }

    Ok(())
}

async fn handle_message(bot: &Bot, msg: &Message, data: &BotData) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        tracing::warn!("Ignoring message without sender in chat {}", msg.chat.id);
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    let Some(text) = msg.text() else {
        tracing::debug!("Ignoring non-text message from user {}", user_id);
        return Ok(());
    };

    if !data.rate_limiter.check(user_id).await {
        tracing::warn!("Rate limit exceeded for user {}", user_id);
        bot.send_message(msg.chat.id, presentation::RATE_LIMITED_TEXT)
            .await?;
        return Ok(());
    }

    let inbound = InboundMessage::parse(user_id, text);
    let replies = data.controller.handle(&inbound).await;

    for reply in &replies {
        tracing::debug!("Sending {} to user {}", reply, user_id);
        send_outbound(bot, msg.chat.id, reply).await?;
    }

    Ok(())
}

struct BotData {
    controller: Controller,
    rate_limiter: RateLimiter,
}

/// Fixed-window throttle per user; windows that have run out are evicted
struct RateLimiter {
    /// Messages allowed per window (0 = unlimited)
    max_requests: u32,
    window: Duration,
    windows: RwLock<HashMap<i64, UserWindow>>,
}

struct UserWindow {
    opened: Instant,
    used: u32,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Count one message from `user_id`; false when over budget
    async fn check(&self, user_id: i64) -> bool {
        if self.max_requests == 0 {
            return true;
        }

        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, w| now.duration_since(w.opened) < self.window);

        let window = windows.entry(user_id).or_insert(UserWindow {
            opened: now,
            used: 0,
        });
        if window.used >= self.max_requests {
            return false;
        }

        window.used += 1;
        true
    }

    /// Users with an open window
    async fn tracked_users(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Deliver one reply
async fn send_outbound(bot: &Bot, chat_id: ChatId, reply: &Outbound) -> Result<()> {
    match reply {
        Outbound::Text { text, keyboard } => {
            let markup = keyboard.as_ref().and_then(reply_markup);
            send_long_message(bot, chat_id, text, markup).await
        }
        Outbound::Media {
            media,
            caption,
            keyboard,
        } => {
            let markup = keyboard.as_ref().and_then(reply_markup);
            if media.trim().is_empty() {
                return send_long_message(bot, chat_id, caption, markup).await;
            }

            let sent = send_media(bot, chat_id, media, caption, markup.clone()).await;
            match caption_fallback(sent, media, caption) {
                Some(text) => send_long_message(bot, chat_id, text, markup).await,
                None => Ok(()),
            }
        }
    }
}

/// Photo or animation with caption and keyboard
async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    media: &str,
    caption: &str,
    markup: Option<ReplyMarkup>,
) -> Result<(), teloxide::RequestError> {
    let file = media_input(media);

    if is_animation(media) {
        let mut request = bot.send_animation(chat_id, file).caption(caption);
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await?;
    } else {
        let mut request = bot.send_photo(chat_id, file).caption(caption);
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await?;
    }
    Ok(())
}

/// Text to resend when the media was rejected, so the title and its
/// episode buttons still arrive
fn caption_fallback<'a, E: std::fmt::Display>(
    sent: Result<(), E>,
    media: &str,
    caption: &'a str,
) -> Option<&'a str> {
    match sent {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("Media {:?} rejected ({}), sending caption as text", media, e);
            Some(caption)
        }
    }
}

/// Send text split at the message limit; the keyboard goes on the last part
async fn send_long_message(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
) -> Result<()> {
    let chunks = split_message(text);
    let last = chunks.len().saturating_sub(1);

    for (idx, chunk) in chunks.into_iter().enumerate() {
        let mut request = bot.send_message(chat_id, chunk);
        if idx == last {
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
        }
        request.await?;
    }
    Ok(())
}

/// Split text into chunks of at most [`MAX_MESSAGE_CHARS`], on char boundaries
fn split_message(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return vec!["(empty)"];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .nth(MAX_MESSAGE_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest;
    }
    chunks
}

/// Convert a keyboard; `None` when nothing usable remains
fn reply_markup(keyboard: &Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::Inline(rows) => {
            let rows: Vec<Vec<InlineKeyboardButton>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .filter_map(|button| match reqwest::Url::parse(&button.url) {
                            Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
                            Err(e) => {
                                tracing::warn!(
                                    "Dropping button {} with invalid link {:?}: {}",
                                    button.label,
                                    button.url,
                                    e
                                );
                                None
                            }
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|row| !row.is_empty())
                .collect();

            if rows.is_empty() {
                None
            } else {
                Some(ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(rows)))
            }
        }
        Keyboard::Reply(rows) => {
            let rows: Vec<Vec<KeyboardButton>> = rows
                .iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect())
                .collect();
            Some(ReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard()))
        }
    }
}

/// HTTP(S) references are fetched by Telegram; anything else is a file id
fn media_input(media: &str) -> InputFile {
    match reqwest::Url::parse(media) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => InputFile::url(url),
        _ => InputFile::file_id(media.to_string()),
    }
}

fn is_animation(media: &str) -> bool {
    let path = match reqwest::Url::parse(media) {
        Ok(url) => url.path().to_lowercase(),
        Err(_) => media.to_lowercase(),
    };
    path.ends_with(".gif") || path.ends_with(".mp4")
}
