//! Telegram adapter (teloxide).
//!
//! This crate implements the `cvb-core` MessagingPort over the Telegram Bot
//! API and hosts the command layer that drives the core.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use cvb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::TransferRoute},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_send_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// For edits/deletes: an API-level refusal (message gone, not editable,
    /// rate-limited past the retry budget) is recoverable via
    /// delete-and-repost, so it maps to `TransportRejected`; network
    /// failures stay `External`.
    fn map_update_err(e: teloxide::RequestError) -> Error {
        match e {
            teloxide::RequestError::Api(api) => Error::TransportRejected(api.to_string()),
            teloxide::RequestError::RetryAfter(d) => {
                Error::TransportRejected(format!("rate limited, retry after {d:?}"))
            }
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, teloxide::RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(other),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
            })
            .await
            .map_err(Self::map_send_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await
        .map_err(Self::map_update_err)?;
        Ok(())
    }

    async fn delete(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await
        .map_err(Self::map_update_err)?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        display_name: &str,
        caption: &str,
        route: TransferRoute,
    ) -> Result<()> {
        if route == TransferRoute::Large {
            // Bot API uploads above the threshold are slow and may need a
            // local API server; surfaced here so the operator sees why.
            tracing::info!(path = %path.display(), "using large-file upload route");
        }

        let input = InputFile::file(path.to_path_buf()).file_name(display_name.to_string());
        self.with_retry(|| {
            self.bot
                .send_document(Self::tg_chat(chat_id), input.clone())
                .caption(caption.to_string())
        })
        .await
        .map_err(Self::map_send_err)?;
        Ok(())
    }
}
