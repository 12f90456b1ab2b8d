use std::sync::Arc;

use teloxide::prelude::*;

use mrelay_core::{
    domain::{ChatId, UserId},
    messaging::types::ControlAction,
    security::owns_callback,
};

use crate::router::AppState;

use super::{launch_job, Launch};

/// Stop / Restart buttons on status messages (`stop:<owner>`, `restart:<owner>`).
pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let messenger = state.messenger.clone();
    let cb_id = q.id.clone();
    let presser = UserId(q.from.id.0 as i64);
    let chat_id = q.message.as_ref().map(|m| ChatId(m.chat.id.0));
    let data = q.data.clone().unwrap_or_default();

    let (Some(chat_id), Some((action, owner))) = (chat_id, ControlAction::parse(&data)) else {
        let _ = messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };

    if !owns_callback(presser, owner, &state.cfg.allowed_users) {
        tracing::warn!(presser = presser.0, owner = owner.0, "callback rejected");
        let _ = messenger
            .answer_callback_query(&cb_id, Some("Unauthorized"))
            .await;
        return Ok(());
    }

    match action {
        ControlAction::Stop => {
            let text = if state.engine.stop_job(owner).await {
                "Stopping..."
            } else {
                "Nothing to stop"
            };
            let _ = messenger.answer_callback_query(&cb_id, Some(text)).await;
        }
        ControlAction::Restart => {
            let _ = messenger
                .answer_callback_query(&cb_id, Some("Restarting from the first message"))
                .await;
            launch_job(&state, chat_id, owner, Launch::Restart).await;
        }
    }
    Ok(())
}
