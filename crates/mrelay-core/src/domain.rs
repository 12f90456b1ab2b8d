use std::fmt;

/// Telegram user id (numeric). Operators are identified by this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Opaque numeric identifier of a source channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub i64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved, monitorable source stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub id: SourceId,
    pub name: String,
}

impl SourceRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: SourceId(id),
            name: name.into(),
        }
    }
}

/// Message position inside one source. Not comparable across sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(pub i64);

impl Position {
    pub const FIRST: Position = Position(1);

    pub fn next(self) -> Position {
        Position(self.0.saturating_add(1))
    }

    pub fn prev(self) -> Position {
        Position(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
    Video,
    /// Link preview generated from a URL in the text.
    WebPage,
    /// Media the transport could not decode.
    Unsupported,
    /// Anything else the transport reports (polls, contacts, geo, ...).
    Other(String),
}

impl MediaKind {
    pub fn is_preview_or_unsupported(&self) -> bool {
        matches!(self, MediaKind::WebPage | MediaKind::Unsupported)
    }

    pub fn is_relayable(&self) -> bool {
        matches!(self, MediaKind::Photo | MediaKind::Document | MediaKind::Video)
    }
}

/// Media attachment plus the opaque transport reference used to re-send it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub file_ref: String,
}

/// What the classifier needs to know about one fetched message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub position: Position,
    pub media: Option<Media>,
    pub no_forwards: bool,
    pub is_service: bool,
}
