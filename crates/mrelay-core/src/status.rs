//! Operator-facing status rendering.
//!
//! A backfill owns one status message that is edited in place. The keyboard
//! shows Stop while the job runs and Restart once it has ended.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    checkpoint::MonitoredSource,
    domain::{MessageRef, UserId},
    formatting::{escape_html, format_wait, percent, progress_bar},
    messaging::{
        port::MessagingPort,
        types::{ControlAction, InlineButton, InlineKeyboard},
    },
    ports::ProgressSink,
    progress::{JobEnd, JobEvent, JobProgress},
    registry::{JobSnapshot, JobState, RangeEnd},
    Result,
};

const BAR_WIDTH: usize = 10;

pub fn stop_keyboard(owner: UserId) -> InlineKeyboard {
    InlineKeyboard::new(vec![InlineButton::new(
        "⏹ Stop",
        ControlAction::Stop.callback_data(owner),
    )])
}

pub fn restart_keyboard(owner: UserId) -> InlineKeyboard {
    InlineKeyboard::new(vec![InlineButton::new(
        "🔄 Restart",
        ControlAction::Restart.callback_data(owner),
    )])
}

pub fn keyboard_for(event: &JobEvent, owner: UserId) -> InlineKeyboard {
    match event {
        JobEvent::Finished { .. } | JobEvent::MonitoringStarted { .. } => restart_keyboard(owner),
        _ => stop_keyboard(owner),
    }
}

fn counts(p: &JobProgress) -> String {
    let mut out = format!(
        "Position: <code>{}</code>\nRelayed: <b>{}</b> · Skipped: {}",
        p.current, p.relayed, p.skipped
    );
    if let Some(pct) = percent(p.relayed, p.estimated_total) {
        out.push_str(&format!(
            "\n{} {pct}% of ~{} media",
            progress_bar(pct, BAR_WIDTH),
            p.estimated_total
        ));
    }
    out
}

pub fn render_event(event: &JobEvent) -> String {
    match event {
        JobEvent::Estimating { source } => format!(
            "🔎 Counting media in <b>{}</b>...",
            escape_html(&source.name)
        ),
        JobEvent::Started(p) | JobEvent::Progress(p) => format!(
            "📤 <b>Relaying</b> {}\n\n{}",
            escape_html(&p.source.name),
            counts(p)
        ),
        JobEvent::Waiting { progress, wait } => format!(
            "⏳ <b>Rate limited</b>, resuming in {}\n{}\n\n{}",
            format_wait(*wait),
            escape_html(&progress.source.name),
            counts(progress)
        ),
        JobEvent::Finished { progress, end } => {
            let head = match end {
                JobEnd::Exhausted => "✅ <b>Done</b>",
                JobEnd::HistoryEnd => "🏁 <b>Reached end of history</b>",
                JobEnd::Cancelled => "⏹ <b>Stopped</b>",
            };
            format!(
                "{head} {}\n\n{}",
                escape_html(&progress.source.name),
                counts(progress)
            )
        }
        JobEvent::MonitoringStarted { source, checkpoint } => format!(
            "👀 Now monitoring <b>{}</b> for new media after <code>{checkpoint}</code>",
            escape_html(&source.name)
        ),
    }
}

pub fn render_snapshot(snapshot: Option<&JobSnapshot>) -> String {
    let Some(s) = snapshot else {
        return "No backfill running.".to_string();
    };
    let state = match s.state {
        JobState::Active => "▶️ Running",
        JobState::Stopped => "⏹ Stopped",
    };
    let end = match s.params.end {
        RangeEnd::At(p) => p.to_string(),
        RangeEnd::Latest => "latest".to_string(),
    };
    let mut out = format!(
        "{state}: <b>{}</b>\nRange: <code>{}</code> → <code>{end}</code>",
        escape_html(&s.params.source.name),
        s.params.start
    );
    if let Some(p) = &s.progress {
        out.push_str("\n\n");
        out.push_str(&counts(p));
    }
    out
}

pub fn render_monitored(sources: &[(MonitoredSource, bool)]) -> String {
    if sources.is_empty() {
        return "No monitored channels.".to_string();
    }
    let mut out = String::from("<b>Monitored channels</b>\n");
    for (m, live) in sources {
        let mark = if *live { "🟢" } else { "⚪" };
        out.push_str(&format!(
            "\n{mark} <b>{}</b> <code>{}</code>\n   last: <code>{}</code> · since {}",
            escape_html(&m.record.name),
            m.source.id,
            m.record.last_msg_id,
            escape_html(&m.record.added_at)
        ));
    }
    out
}

/// Edits the job's status message on every event.
pub struct StatusSink {
    messenger: Arc<dyn MessagingPort>,
    message: MessageRef,
    owner: UserId,
}

impl StatusSink {
    pub fn new(messenger: Arc<dyn MessagingPort>, message: MessageRef, owner: UserId) -> Self {
        Self {
            messenger,
            message,
            owner,
        }
    }
}

#[async_trait]
impl ProgressSink for StatusSink {
    async fn report(&self, event: &JobEvent) -> Result<()> {
        let html = render_event(event);
        if let JobEvent::MonitoringStarted { .. } = event {
            // Keep the final summary; announce monitoring separately.
            self.messenger
                .send_html(self.message.chat_id, &html)
                .await?;
            return Ok(());
        }
        self.messenger
            .edit_inline_keyboard(self.message, &html, Some(keyboard_for(event, self.owner)))
            .await
    }
}
