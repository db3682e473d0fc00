// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Telegram transport for channel auto-processing

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, Recipient};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::admin::AdminStore;
use crate::autoproc::{
    AudioAttachment, AutoProcessor, ChannelClient, ChannelPost, ChatRef, OutgoingAudio,
    ProcessOutcome, Retagger,
};
use crate::config::AppConfig;
use crate::db::Database;
use crate::templates::TemplateStore;
use crate::{AudioTagError, Result};

/// [`ChannelClient`] backed by the Bot API
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
    http: Client,
    api_url: String,
}

impl TelegramClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let token = config.telegram.token.trim();
        if token.is_empty() {
            return Err(AudioTagError::Config(
                "Telegram token is not set (TELEGRAM_TOKEN)".to_string(),
            ));
        }

        let http = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(config.telegram.timeout_secs))
            .build()?;

        let api_url = config.telegram.api_url.trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&api_url)
            .map_err(|e| AudioTagError::Config(format!("Invalid api_url {}: {}", api_url, e)))?;
        let bot = Bot::with_client(token, http.clone()).set_api_url(url);

        Ok(Self { bot, http, api_url })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.bot.token(), file_path)
    }
}

/// Copy a chunked body into `dest`; a partial file is removed on error
async fn write_stream<S, B, E>(mut body: S, dest: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    AudioTagError: From<E>,
{
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    let copied: Result<()> = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = copied {
        drop(file);
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e);
    }
    Ok(written)
}

fn recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Id(id) => Recipient::Id(ChatId(*id)),
        ChatRef::Username(name) => Recipient::ChannelUsername(name.clone()),
    }
}

#[async_trait]
impl ChannelClient for TelegramClient {
    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        let file = self.bot.get_file(file_id.to_string()).await?;
        debug!("Downloading {} ({} bytes)", file.path, file.size);

        let response = self
            .http
            .get(self.file_url(&file.path))
            .send()
            .await?
            .error_for_status()?;
        let written = write_stream(Box::pin(response.bytes_stream()), dest).await?;
        debug!("Wrote {} bytes to {:?}", written, dest);
        Ok(())
    }

    async fn send_audio(&self, audio: &OutgoingAudio<'_>) -> Result<i32> {
        let mut req = self
            .bot
            .send_audio(ChatId(audio.chat_id), InputFile::file(audio.path.to_path_buf()));

        if let Some(caption) = audio.caption {
            req.caption = Some(caption.to_string());
        }
        if let Some(title) = audio.title {
            req.title = Some(title.to_string());
        }
        if let Some(performer) = audio.performer {
            req.performer = Some(performer.to_string());
        }
        if let Some(thumb) = audio.thumbnail {
            req.thumbnail = Some(InputFile::file(thumb.to_path_buf()));
        }

        let sent = req.await?;
        Ok(sent.id.0)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn copy_message(
        &self,
        to: &ChatRef,
        from_chat_id: i64,
        message_id: i32,
        caption: Option<&str>,
    ) -> Result<i32> {
        let mut req = self
            .bot
            .copy_message(recipient(to), ChatId(from_chat_id), MessageId(message_id));
        if let Some(caption) = caption {
            req.caption = Some(caption.to_string());
        }
        let copied = req.await?;
        Ok(copied.0)
    }
}

/// Flatten a channel post into what the processor needs
pub fn channel_post(msg: &Message) -> ChannelPost {
    ChannelPost {
        chat_id: msg.chat.id.0,
        chat_username: msg.chat.username().map(String::from),
        chat_title: msg.chat.title().map(String::from),
        is_channel: msg.chat.is_channel(),
        message_id: msg.id.0,
        caption: msg.caption().map(String::from),
        audio: msg.audio().map(|a| AudioAttachment {
            file_id: a.file.id.to_string(),
            file_name: a.file_name.clone(),
            title: a.title.clone(),
            performer: a.performer.clone(),
            size_bytes: a.file.size as u64,
        }),
    }
}

async fn handle_channel_post(msg: Message, processor: AutoProcessor) -> ResponseResult<()> {
    let post = channel_post(&msg);
    match processor.process(&post).await {
        Ok(ProcessOutcome::Published { message_id, merge }) => info!(
            "Channel post {} republished as {} ({} fields changed)",
            post.message_id,
            message_id,
            merge.changed_fields.len()
        ),
        Ok(ProcessOutcome::Skipped(reason)) => {
            debug!("Channel post {} skipped: {:?}", post.message_id, reason)
        }
        Err(e) => error!("Channel post {} failed: {}", post.message_id, e),
    }
    Ok(())
}

/// Build the processor from config and run the dispatcher until Ctrl+C
pub async fn run_bot(config: AppConfig) -> Result<()> {
    config.ensure_dirs()?;

    let db = Database::open(&config.database.path)?;
    info!("Database initialized: {}", config.database.path);

    let admin = AdminStore::open(Path::new(&config.paths.admin_data), &config)?;
    let templates = TemplateStore::new(config.templates_dir());
    let client = TelegramClient::new(&config)?;
    let bot = client.bot().clone();

    let retagger = Retagger::new(admin, db.rules(), templates);
    let processor = AutoProcessor::new(Arc::new(client), retagger, config.temp_dir())
        .with_max_audio_mb(config.limits.max_audio_size_mb);

    let settings = processor.admin().auto_processing()?;
    if settings.enabled {
        info!("Auto-processing enabled for {}", settings.source_channel);
    } else {
        warn!("Auto-processing is disabled; channel posts will be ignored");
    }

    let handler = Update::filter_channel_post()
        .filter(|msg: Message, processor: AutoProcessor| {
            let post = channel_post(&msg);
            processor.matches_source(&post).unwrap_or_else(|e| {
                warn!("Cannot read source channel setting: {}", e);
                false
            })
        })
        .endpoint(handle_channel_post);

    info!("Bot started. Press Ctrl+C to stop.");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![processor])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped.");
    Ok(())
}
