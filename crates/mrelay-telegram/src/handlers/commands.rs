use std::sync::Arc;

use teloxide::prelude::*;

use mrelay_core::{
    domain::{ChatId, Position, SourceId, UserId},
    errors::Error,
    formatting::{escape_html, format_wait},
    registry::{JobParams, RangeEnd},
    status::{render_monitored, render_snapshot},
};

use crate::router::AppState;

use super::{launch_job, Launch};

/// Telegram caps messages at 4096 chars; leave room for entities.
const SAFE_MESSAGE_LEN: usize = 4000;

const HELP: &str = "🤖 <b>Media relay</b>

Copies photos, videos and documents from a source channel into the destination channel, then keeps watching it for new media.

<b>Step by step</b>
1. Send the source channel link (invite or message link)
2. Send the link of the first message to copy
3. Send the link of the last message to copy

<b>Commands</b>
/new - start over with a new source
/copyall &lt;link&gt; - copy everything from the first message to the latest
/stop - stop the running backfill
/restart - run the last backfill again from the beginning
/status - current backfill and monitored channels
/monitored - list monitored channels
/unmonitor &lt;id&gt; - stop monitoring a channel";

const ASK_SOURCE: &str = "📎 Send the source channel link.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Split on line boundaries so no tag is cut in half.
fn split_lines(html: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in html.split('\n') {
        if !chunk.is_empty() && chunk.len() + 1 + line.len() > limit {
            out.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push('\n');
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() || out.is_empty() {
        out.push(chunk);
    }
    out
}

async fn send_html_split(state: &AppState, chat_id: ChatId, html: &str) {
    let limit = state
        .messenger
        .capabilities()
        .max_message_len
        .min(SAFE_MESSAGE_LEN);
    for chunk in split_lines(html, limit) {
        if let Err(e) = state.messenger.send_html(chat_id, &chunk).await {
            tracing::warn!(chat = chat_id.0, "send failed: {e}");
        }
    }
}

fn describe_error(e: &Error) -> String {
    match e {
        Error::InvalidLink(reason) => reason.clone(),
        Error::RateLimited(wait) => format!("Rate limited, try again in {}", format_wait(*wait)),
        other => other.to_string(),
    }
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let owner = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, args) = parse_command(msg.text().unwrap_or(""));
    tracing::debug!(owner = owner.0, %cmd, "command");

    match cmd.as_str() {
        "start" | "help" => {
            state.engine.intake_reset(owner).await;
            send_html_split(&state, chat_id, &format!("{HELP}\n\n{ASK_SOURCE}")).await;
        }

        "new" => {
            state.engine.intake_reset(owner).await;
            send_html_split(&state, chat_id, ASK_SOURCE).await;
        }

        "copyall" => {
            if args.is_empty() {
                send_html_split(&state, chat_id, "Usage: /copyall &lt;channel link&gt;").await;
                return Ok(());
            }
            if state.engine.is_job_active(owner).await {
                send_html_split(
                    &state,
                    chat_id,
                    "⚠️ A backfill is already running. Use /stop first.",
                )
                .await;
                return Ok(());
            }
            match state.engine.resolve_link(&args).await {
                Ok(source) => {
                    let params = JobParams {
                        source,
                        start: Position::FIRST,
                        end: RangeEnd::Latest,
                    };
                    launch_job(&state, chat_id, owner, Launch::Fresh(params)).await;
                }
                Err(e) => {
                    let html = format!("❌ {}", escape_html(&describe_error(&e)));
                    send_html_split(&state, chat_id, &html).await;
                }
            }
        }

        "stop" => {
            let text = if state.engine.stop_job(owner).await {
                "⏹ Stopping..."
            } else {
                "No backfill is running."
            };
            send_html_split(&state, chat_id, text).await;
        }

        "restart" => {
            launch_job(&state, chat_id, owner, Launch::Restart).await;
        }

        "status" => {
            let snapshot = state.engine.job_snapshot(owner).await;
            let monitored = state.engine.monitored().await;
            let html = format!(
                "{}\n\n{}",
                render_snapshot(snapshot.as_ref()),
                render_monitored(&monitored)
            );
            send_html_split(&state, chat_id, &html).await;
        }

        "monitored" => {
            let monitored = state.engine.monitored().await;
            send_html_split(&state, chat_id, &render_monitored(&monitored)).await;
        }

        "unmonitor" => {
            let Ok(id) = args.trim().parse::<i64>() else {
                send_html_split(&state, chat_id, "Usage: /unmonitor &lt;channel id&gt;").await;
                return Ok(());
            };
            let html = match state.engine.unmonitor(SourceId(id)).await {
                Ok(true) => format!("✅ Stopped monitoring <code>{id}</code>"),
                Ok(false) => format!("<code>{id}</code> is not monitored."),
                Err(e) => format!("❌ {}", escape_html(&e.to_string())),
            };
            send_html_split(&state, chat_id, &html).await;
        }

        _ => {
            let html = format!("Unknown command: /{}", escape_html(&cmd));
            send_html_split(&state, chat_id, &html).await;
        }
    }
    Ok(())
}
