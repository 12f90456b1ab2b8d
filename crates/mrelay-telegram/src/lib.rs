//! Telegram adapter (teloxide).
//!
//! Implements the `mrelay-core` MessagingPort over the Bot API and hosts the
//! operator command surface.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use mrelay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
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

    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::RetryAfter(d) => Error::RateLimited(d),
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    fn markup(keyboard: Option<InlineKeyboard>) -> InlineKeyboardMarkup {
        let row: Vec<InlineKeyboardButton> = keyboard
            .map(|k| k.buttons)
            .unwrap_or_default()
            .into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
            .collect();
        if row.is_empty() {
            InlineKeyboardMarkup::new(Vec::<Vec<InlineKeyboardButton>>::new())
        } else {
            InlineKeyboardMarkup::new(vec![row])
        }
    }

    /// Run a request, sleeping through one `RetryAfter`.
    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::debug!(wait_secs = d.as_secs(), "telegram asked us to back off");
                    sleep(d).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Edits that change nothing are not failures.
    fn edit_outcome<T>(res: std::result::Result<T, RequestError>) -> Result<()> {
        match res {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        let res = self
            .with_retry(|| {
                self.bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        html.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
            })
            .await;
        Self::edit_outcome(res)
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::markup(Some(keyboard));
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let markup = Self::markup(keyboard);
        let res = self
            .with_retry(|| {
                self.bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        html.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await;
        Self::edit_outcome(res)
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mrelay_core::messaging::types::InlineButton;

    use super::*;

    #[test]
    fn keyboard_buttons_share_one_row() {
        let kb = InlineKeyboard::new(vec![
            InlineButton::new("Stop", "stop:1"),
            InlineButton::new("Restart", "restart:1"),
        ]);
        let markup = TelegramMessenger::markup(Some(kb));
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn missing_keyboard_clears_markup() {
        assert!(TelegramMessenger::markup(None).inline_keyboard.is_empty());
    }

    #[test]
    fn retry_after_maps_to_rate_limited() {
        let e = TelegramMessenger::map_err(RequestError::RetryAfter(
            std::time::Duration::from_secs(3),
        ));
        assert!(matches!(e, Error::RateLimited(d) if d == std::time::Duration::from_secs(3)));
    }
}
