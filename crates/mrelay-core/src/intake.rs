//! Per-operator link-entry wizard.
//!
//! Source link → start message link → end message link, then back to the
//! beginning. Bad input re-prompts at the same step.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{
    domain::{Position, SourceRef, UserId},
    errors::Error,
    links::parse_message_link,
    registry::{JobParams, RangeEnd},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntakeStep {
    #[default]
    AwaitSource,
    AwaitStart,
    AwaitEnd,
}

#[derive(Clone, Debug, Default)]
struct OperatorSession {
    step: IntakeStep,
    source: Option<SourceRef>,
    start: Option<Position>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeReply {
    SourceAccepted(SourceRef),
    StartAccepted(Position),
    /// All three links collected; the session has been reset.
    Ready(JobParams),
    Rejected { step: IntakeStep, reason: String },
}

#[derive(Default)]
pub struct IntakeSessions {
    sessions: Mutex<HashMap<UserId, OperatorSession>>,
}

impl IntakeSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset(&self, owner: UserId) {
        self.sessions.lock().await.remove(&owner);
    }

    pub async fn step(&self, owner: UserId) -> IntakeStep {
        self.sessions
            .lock()
            .await
            .get(&owner)
            .map(|s| s.step)
            .unwrap_or_default()
    }

    /// Step 0 with an already-resolved source.
    pub async fn accept_source(&self, owner: UserId, source: SourceRef) -> IntakeReply {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(owner).or_default();
        if session.step != IntakeStep::AwaitSource {
            return rejected(session.step, "Not expecting a source link right now");
        }
        session.source = Some(source.clone());
        session.start = None;
        session.step = IntakeStep::AwaitStart;
        IntakeReply::SourceAccepted(source)
    }

    /// Feed raw operator text to the current step (steps 1 and 2).
    pub async fn accept_position(&self, owner: UserId, text: &str) -> IntakeReply {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(owner).or_default();
        let step = session.step;
        if step == IntakeStep::AwaitSource {
            return rejected(step, "Send the source channel link first");
        }

        let position = match parse_message_link(text) {
            Ok(p) => p,
            Err(Error::InvalidLink(reason)) => return rejected(step, &reason),
            Err(e) => return rejected(step, &e.to_string()),
        };

        if step == IntakeStep::AwaitStart {
            session.start = Some(position);
            session.step = IntakeStep::AwaitEnd;
            return IntakeReply::StartAccepted(position);
        }

        let collected = (session.source.clone(), session.start);
        sessions.remove(&owner);
        match collected {
            (Some(source), Some(start)) => IntakeReply::Ready(JobParams {
                source,
                start,
                end: RangeEnd::At(position),
            }),
            _ => rejected(IntakeStep::AwaitSource, "Session expired, send /new"),
        }
    }
}

fn rejected(step: IntakeStep, reason: &str) -> IntakeReply {
    IntakeReply::Rejected {
        step,
        reason: reason.to_string(),
    }
}
