use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use mrelay_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use mrelay_core::{
    config::Config, domain::ChatId, engine::RelayEngine, messaging::port::MessagingPort,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: RelayEngine,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(cfg: Arc<Config>, engine: RelayEngine) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "bot started"),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    tracing::info!(
        operators = cfg.allowed_users.len(),
        destination = cfg.target_channel,
        "relay front-end ready"
    );

    // Progress edits are bursty; keep the RetryAfter retry in the adapter as well.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    if let Some(&owner) = cfg.allowed_users.first() {
        let engine = engine.clone();
        let messenger = messenger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let html = startup_notice(engine.monitored().await.len());
            if let Err(e) = messenger.send_html(ChatId(owner), &html).await {
                tracing::warn!("startup notification failed: {e}");
            }
        });
    }

    let state = Arc::new(AppState {
        cfg,
        engine,
        messenger,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn startup_notice(monitored: usize) -> String {
    let tail = match monitored {
        0 => "No channels are being monitored.".to_string(),
        1 => "Resumed monitoring of <b>1</b> channel.".to_string(),
        n => format!("Resumed monitoring of <b>{n}</b> channels."),
    };
    format!("🟢 <b>Media relay online</b>\n{tail}\n\nSend /start for help.")
}
