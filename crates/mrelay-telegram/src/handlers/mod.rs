//! Telegram update handlers.
//!
//! Every update is checked against the operator allow-list first; anything
//! else gets a one-line rejection and goes no further.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use mrelay_core::{
    domain::{ChatId, UserId},
    registry::{JobParams, StartRefusal},
    security::is_authorized,
    status::{stop_keyboard, StatusSink},
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.allowed_users) {
        tracing::warn!(user = ?user_id, chat = msg.chat.id.0, "unauthorized message");
        let _ = bot.send_message(msg.chat.id, "Unauthorized.").await;
        return Ok(());
    }

    let Some(is_command) = msg.text().map(|t| t.starts_with('/')) else {
        return Ok(());
    };
    if is_command {
        return commands::handle_command(msg, state).await;
    }
    text::handle_text(msg, state).await
}

/// How a backfill should be launched from the chat.
pub(crate) enum Launch {
    Fresh(JobParams),
    Restart,
}

/// Post a status message with a Stop button and start the job behind it.
pub(crate) async fn launch_job(state: &AppState, chat_id: ChatId, owner: UserId, launch: Launch) {
    let messenger = state.messenger.clone();
    let status = match messenger
        .send_inline_keyboard(chat_id, "⏳ Preparing backfill...", stop_keyboard(owner))
        .await
    {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(owner = owner.0, "cannot post status message: {e}");
            return;
        }
    };

    let sink = Arc::new(StatusSink::new(messenger.clone(), status, owner));
    let started = match launch {
        Launch::Fresh(params) => state.engine.start_job(owner, params, sink).await,
        Launch::Restart => state.engine.restart_job(owner, sink).await,
    };

    if let Err(refusal) = started {
        let text = match refusal {
            StartRefusal::AlreadyActive => "⚠️ A backfill is already running. Use /stop first.",
            StartRefusal::NothingToRestart => "Nothing to restart yet. Send /start to begin.",
        };
        let _ = messenger.edit_inline_keyboard(status, text, None).await;
    }
}
