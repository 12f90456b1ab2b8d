use crate::domain::UserId;

/// Inline keyboard laid out as a single row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

/// Run-control button payloads: `stop:<owner>` and `restart:<owner>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Stop,
    Restart,
}

impl ControlAction {
    const STOP: &'static str = "stop";
    const RESTART: &'static str = "restart";

    pub fn callback_data(self, owner: UserId) -> String {
        let verb = match self {
            ControlAction::Stop => Self::STOP,
            ControlAction::Restart => Self::RESTART,
        };
        format!("{verb}:{}", owner.0)
    }

    pub fn parse(data: &str) -> Option<(ControlAction, UserId)> {
        let (verb, owner) = data.split_once(':')?;
        let action = match verb {
            Self::STOP => ControlAction::Stop,
            Self::RESTART => ControlAction::Restart,
            _ => return None,
        };
        let owner = owner.trim().parse::<i64>().ok()?;
        Some((action, UserId(owner)))
    }
}

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
