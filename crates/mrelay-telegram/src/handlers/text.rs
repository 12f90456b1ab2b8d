use std::sync::Arc;

use teloxide::prelude::*;

use mrelay_core::{
    domain::{ChatId, UserId},
    formatting::escape_html,
    intake::{IntakeReply, IntakeStep},
    utils::truncate_text,
};

use crate::router::AppState;

use super::{launch_job, Launch};

fn prompt_for(step: IntakeStep) -> &'static str {
    match step {
        IntakeStep::AwaitSource => "Send the source channel link.",
        IntakeStep::AwaitStart => "Send the link of the first message to copy.",
        IntakeStep::AwaitEnd => "Send the link of the last message to copy.",
    }
}

fn reply_html(reply: &IntakeReply) -> Option<String> {
    match reply {
        IntakeReply::SourceAccepted(source) => Some(format!(
            "✅ Source: <b>{}</b>\n\n{}",
            escape_html(&truncate_text(&source.name, 64)),
            prompt_for(IntakeStep::AwaitStart)
        )),
        IntakeReply::StartAccepted(position) => Some(format!(
            "✅ Start: <code>{position}</code>\n\n{}",
            prompt_for(IntakeStep::AwaitEnd)
        )),
        IntakeReply::Ready(_) => None,
        IntakeReply::Rejected { step, reason } => Some(format!(
            "❌ {}\n\n{}",
            escape_html(reason),
            prompt_for(*step)
        )),
    }
}

/// Plain text drives the link wizard.
pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    let owner = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);

    let reply = state.engine.intake_input(owner, text.trim()).await;
    if let IntakeReply::Ready(params) = reply {
        tracing::info!(
            owner = owner.0,
            source = %params.source.id,
            start = %params.start,
            "intake complete"
        );
        launch_job(&state, chat_id, owner, Launch::Fresh(params)).await;
        return Ok(());
    }

    if let Some(html) = reply_html(&reply) {
        if let Err(e) = state.messenger.send_html(chat_id, &html).await {
            tracing::warn!(chat = chat_id.0, "send failed: {e}");
        }
    }
    Ok(())
}
