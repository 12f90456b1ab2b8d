//! Recognizes the link shapes operators paste into the bot.

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::Position, errors::Error, Result};

const INVITE_PATTERN: &str = r"https://t\.me/(?:\+|joinchat/)([a-zA-Z0-9_-]+)";
const MESSAGE_PATTERN: &str = r"https://t\.me/(?:c/)?([\w_]+)/(\d+)";

/// Internal channel ids in `t.me/c/<id>/<msg>` links omit this prefix.
const PRIVATE_CHANNEL_PREFIX: i64 = -1_000_000_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelLink {
    /// `https://t.me/+HASH` or `https://t.me/joinchat/HASH`.
    Invite { url: String, hash: String },
    /// `https://t.me/<username>/<msg>`.
    Public { username: String, position: Position },
    /// `https://t.me/c/<internal id>/<msg>`.
    Private { channel_id: i64, position: Position },
}

impl ChannelLink {
    /// Message position carried by the link, if it points at a message.
    pub fn position(&self) -> Option<Position> {
        match self {
            ChannelLink::Invite { .. } => None,
            ChannelLink::Public { position, .. } | ChannelLink::Private { position, .. } => {
                Some(*position)
            }
        }
    }
}

fn invite_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INVITE_PATTERN).expect("invite pattern is valid"))
}

fn message_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MESSAGE_PATTERN).expect("message pattern is valid"))
}

/// Parse any supported link. Invite links take precedence over message links.
pub fn parse_link(input: &str) -> Result<ChannelLink> {
    let input = input.trim();

    if let Some(caps) = invite_re().captures(input) {
        return Ok(ChannelLink::Invite {
            url: caps[0].to_string(),
            hash: caps[1].to_string(),
        });
    }

    let Some(caps) = message_re().captures(input) else {
        return Err(Error::InvalidLink("Invalid link format".to_string()));
    };

    let chat = &caps[1];
    let position = caps[2]
        .parse::<i64>()
        .ok()
        .filter(|p| *p > 0)
        .map(Position)
        .ok_or_else(|| Error::InvalidLink(format!("invalid message id: {}", &caps[2])))?;

    if chat.chars().all(|c| c.is_ascii_digit()) {
        let channel_id = chat
            .parse::<i64>()
            .ok()
            .and_then(|raw| PRIVATE_CHANNEL_PREFIX.checked_sub(raw))
            .ok_or_else(|| Error::InvalidLink(format!("invalid channel id: {chat}")))?;
        return Ok(ChannelLink::Private {
            channel_id,
            position,
        });
    }

    Ok(ChannelLink::Public {
        username: chat.to_string(),
        position,
    })
}

/// Parse a link that must point at a specific message (range endpoints).
pub fn parse_message_link(input: &str) -> Result<Position> {
    parse_link(input)?
        .position()
        .ok_or_else(|| Error::InvalidLink("expected a message link, got an invite link".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invite_links() {
        let link = parse_link("https://t.me/+AbC_12-x").unwrap();
        assert_eq!(
            link,
            ChannelLink::Invite {
                url: "https://t.me/+AbC_12-x".to_string(),
                hash: "AbC_12-x".to_string()
            }
        );
        assert!(matches!(
            parse_link("join here https://t.me/joinchat/XYZ").unwrap(),
            ChannelLink::Invite { .. }
        ));
    }

    #[test]
    fn parses_public_and_private_message_links() {
        assert_eq!(
            parse_link("https://t.me/somechannel/123").unwrap(),
            ChannelLink::Public {
                username: "somechannel".to_string(),
                position: Position(123)
            }
        );
        assert_eq!(
            parse_link("https://t.me/c/1234567890/45").unwrap(),
            ChannelLink::Private {
                channel_id: -1001234567890,
                position: Position(45)
            }
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(matches!(
            parse_link("hello there"),
            Err(Error::InvalidLink(_))
        ));
        assert!(parse_link("https://t.me/somechannel/0").is_err());
        assert!(parse_message_link("https://t.me/+abc").is_err());
        assert_eq!(
            parse_message_link(" https://t.me/chan/9 ").unwrap(),
            Position(9)
        );
    }

    #[test]
    fn oversized_private_ids_are_rejected() {
        assert!(matches!(
            parse_link("https://t.me/c/9223372036854775807/1"),
            Err(Error::InvalidLink(_))
        ));
        assert!(matches!(
            parse_link("https://t.me/c/99999999999999999999/1"),
            Err(Error::InvalidLink(_))
        ));
    }
}
