//! Outbound spacing for operator-facing messages.
//!
//! Status edits during a long backfill arrive every few seconds per operator;
//! spacing them keeps the bot under Bot API flood limits.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls touching the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Next free send slot, globally and per chat.
#[derive(Debug, Default)]
struct Slots {
    global: Option<Instant>,
    chats: HashMap<ChatId, Instant>,
}

impl Slots {
    /// Book the earliest slot satisfying both spacings; returns how long to wait for it.
    fn book(&mut self, cfg: &ThrottleConfig, chat: Option<ChatId>) -> Duration {
        let now = Instant::now();
        let mut at = self.global.map_or(now, |g| g.max(now));
        if let Some(next) = chat.and_then(|c| self.chats.get(&c)) {
            at = at.max(*next);
        }
        self.global = Some(at + cfg.global_min_interval);
        if let Some(chat) = chat {
            self.chats.insert(chat, at + cfg.per_chat_min_interval);
        }
        at.saturating_duration_since(now)
    }
}

/// `MessagingPort` decorator that spaces outbound calls.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots::default()),
        }
    }

    async fn wait_turn(&self, chat: Option<ChatId>) {
        let wait = self.slots.lock().await.book(&self.cfg, chat);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.wait_turn(Some(msg.chat_id)).await;
        self.inner.edit_html(msg, html).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        self.inner
            .send_inline_keyboard(chat_id, text, keyboard)
            .await
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.wait_turn(Some(msg.chat_id)).await;
        self.inner.edit_inline_keyboard(msg, html, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.wait_turn(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
