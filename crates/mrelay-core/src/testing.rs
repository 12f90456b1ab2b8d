//! In-memory fakes for the transport and progress ports.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{
        ChatId, Media, MediaKind, MessageDescriptor, MessageId, MessageRef, Position, SourceId,
        SourceRef,
    },
    errors::Error,
    links::ChannelLink,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    ports::{DestinationTransport, ProgressSink, SourceTransport},
    progress::JobEvent,
    Result,
};

pub fn media(position: i64, kind: MediaKind) -> MessageDescriptor {
    MessageDescriptor {
        position: Position(position),
        media: Some(Media {
            kind,
            file_ref: format!("file-{position}"),
        }),
        no_forwards: false,
        is_service: false,
    }
}

pub fn text(position: i64) -> MessageDescriptor {
    MessageDescriptor {
        position: Position(position),
        media: None,
        no_forwards: false,
        is_service: false,
    }
}

pub enum Scripted {
    RateLimited(Duration),
    Fail,
}

#[derive(Default)]
pub struct FakeSource {
    pub messages: Mutex<BTreeMap<i64, MessageDescriptor>>,
    pub script: Mutex<HashMap<i64, VecDeque<Scripted>>>,
    pub fetches: Mutex<Vec<i64>>,
    pub fail_recent: bool,
}

impl FakeSource {
    pub fn with(messages: Vec<MessageDescriptor>) -> Self {
        let src = Self::default();
        {
            let mut map = src.messages.lock().unwrap();
            for m in messages {
                map.insert(m.position.0, m);
            }
        }
        src
    }

    pub fn script(&self, position: i64, outcome: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(position)
            .or_default()
            .push_back(outcome);
    }

    pub fn push(&self, m: MessageDescriptor) {
        self.messages.lock().unwrap().insert(m.position.0, m);
    }

    pub fn fetched(&self) -> Vec<i64> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceTransport for FakeSource {
    async fn resolve(&self, link: &ChannelLink) -> Result<SourceRef> {
        match link {
            ChannelLink::Private { channel_id, .. } => Ok(SourceRef::new(*channel_id, "Private")),
            ChannelLink::Public { username, .. } => Ok(SourceRef::new(42, username.clone())),
            ChannelLink::Invite { hash, .. } if hash == "expired" => {
                Err(Error::External("invite expired".to_string()))
            }
            ChannelLink::Invite { hash, .. } => Ok(SourceRef::new(77, format!("invite {hash}"))),
        }
    }

    async fn fetch_message(
        &self,
        _source: SourceId,
        position: Position,
    ) -> Result<Option<MessageDescriptor>> {
        self.fetches.lock().unwrap().push(position.0);
        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&position.0)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(Scripted::RateLimited(d)) => return Err(Error::RateLimited(d)),
            Some(Scripted::Fail) => return Err(Error::External("boom".to_string())),
            None => {}
        }
        Ok(self.messages.lock().unwrap().get(&position.0).cloned())
    }

    async fn fetch_latest(&self, _source: SourceId) -> Result<Option<MessageDescriptor>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .values()
            .next_back()
            .cloned())
    }

    async fn recent_messages(
        &self,
        _source: SourceId,
        limit: usize,
    ) -> Result<Vec<MessageDescriptor>> {
        if self.fail_recent {
            return Err(Error::External("history unavailable".to_string()));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeDestination {
    pub sent: Mutex<Vec<String>>,
    pub reject: Mutex<Vec<String>>,
}

impl FakeDestination {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationTransport for FakeDestination {
    async fn relay_media(&self, media: &Media) -> Result<()> {
        if self.reject.lock().unwrap().contains(&media.file_ref) {
            return Err(Error::External("CHAT_WRITE_FORBIDDEN".to_string()));
        }
        self.sent.lock().unwrap().push(media.file_ref.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<JobEvent>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, event: &JobEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(Error::External("message is not modified".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Html {
        chat: i64,
        html: String,
    },
    Edit {
        message: i32,
        html: String,
        keyboard: Option<InlineKeyboard>,
    },
    Keyboard {
        chat: i64,
        html: String,
        keyboard: InlineKeyboard,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<Sent>>,
    pub next_id: Mutex<i32>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn next_ref(&self, chat_id: ChatId) -> MessageRef {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*id),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Html {
            chat: chat_id.0,
            html: html.to_string(),
        });
        Ok(self.next_ref(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.edit_inline_keyboard(msg, html, None).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent::Keyboard {
            chat: chat_id.0,
            html: html.to_string(),
            keyboard,
        });
        Ok(self.next_ref(chat_id))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit {
            message: msg.message_id.0,
            html: html.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
