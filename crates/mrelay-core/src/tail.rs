//! Checkpointed tail-follow for one monitored source.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    checkpoint::CheckpointStore,
    config::RelayTuning,
    domain::{Position, SourceRef},
    errors::Error,
    relay::{pause, Relay, Step},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    /// Source is no longer in the checkpoint store; the monitor should exit.
    Deregistered,
    /// Nothing new past the checkpoint.
    Idle { checkpoint: Position },
    /// A delta was processed and the checkpoint advanced to `checkpoint`.
    Delta {
        relayed: u64,
        skipped: u64,
        checkpoint: Position,
    },
    /// Latest position could not be read; retried next cycle.
    Failed,
    /// The monitor was cancelled mid-cycle.
    Cancelled,
}

pub struct TailMonitor {
    relay: Relay,
    store: Arc<CheckpointStore>,
    tuning: RelayTuning,
}

impl TailMonitor {
    pub fn new(relay: Relay, store: Arc<CheckpointStore>, tuning: RelayTuning) -> Self {
        Self {
            relay,
            store,
            tuning,
        }
    }

    /// Poll until the source is deregistered or `cancel` fires.
    pub async fn run(&self, source: SourceRef, cancel: CancellationToken) {
        tracing::info!(source = %source.id, name = %source.name, "tail monitor started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.poll_once(&source, &cancel).await {
                Poll::Deregistered | Poll::Cancelled => break,
                Poll::Delta {
                    relayed,
                    skipped,
                    checkpoint,
                } => {
                    tracing::info!(
                        source = %source.id,
                        relayed,
                        skipped,
                        %checkpoint,
                        "tail delta processed"
                    );
                }
                Poll::Idle { .. } | Poll::Failed => {}
            }
            pause(self.tuning.poll_interval, &cancel).await;
        }
        tracing::info!(source = %source.id, "tail monitor stopped");
    }

    /// One poll cycle: relay everything past the checkpoint, then advance it.
    ///
    /// A cancelled cycle stops before the next position and leaves the
    /// per-cycle checkpoint untouched.
    pub async fn poll_once(&self, source: &SourceRef, cancel: &CancellationToken) -> Poll {
        let Some(record) = self.store.get(source.id).await else {
            return Poll::Deregistered;
        };
        let checkpoint = record.position();

        let latest = loop {
            if cancel.is_cancelled() {
                return Poll::Cancelled;
            }
            match self.relay.source().fetch_latest(source.id).await {
                Ok(Some(m)) => break m.position,
                Ok(None) => return Poll::Idle { checkpoint },
                Err(Error::RateLimited(wait)) => {
                    let wait_secs = wait.as_secs();
                    tracing::warn!(source = %source.id, wait_secs, "rate limited reading tail");
                    pause(wait, cancel).await;
                }
                Err(e) => {
                    tracing::warn!(source = %source.id, "cannot read latest position: {e}");
                    return Poll::Failed;
                }
            }
        };
        if latest <= checkpoint {
            return Poll::Idle { checkpoint };
        }

        let mut relayed = 0u64;
        let mut skipped = 0u64;
        let mut position = checkpoint.next();
        while position <= latest {
            if cancel.is_cancelled() {
                tracing::info!(source = %source.id, %position, "tail delta interrupted");
                return Poll::Cancelled;
            }
            let paced = match self.relay.step(source.id, position).await {
                Step::RateLimited(wait) => {
                    let wait_secs = wait.as_secs();
                    tracing::warn!(source = %source.id, %position, wait_secs, "rate limited");
                    pause(wait, cancel).await;
                    continue;
                }
                Step::Relayed => {
                    relayed += 1;
                    true
                }
                Step::SendFailed => {
                    skipped += 1;
                    true
                }
                Step::Skipped(_) | Step::FetchFailed => {
                    skipped += 1;
                    false
                }
            };
            if self.tuning.checkpoint_every_message {
                self.advance(source, position).await;
            }
            if paced {
                pause(self.tuning.tail_item_delay, cancel).await;
            }
            position = position.next();
        }

        self.advance(source, latest).await;
        Poll::Delta {
            relayed,
            skipped,
            checkpoint: latest,
        }
    }

    async fn advance(&self, source: &SourceRef, position: Position) {
        if let Err(e) = self.store.advance(source.id, position).await {
            tracing::error!(source = %source.id, %position, "checkpoint write failed: {e}");
        }
    }
}
