//! One fetch → classify → relay step, shared by backfill and tail monitoring.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    classifier::{classify, SkipReason, Verdict},
    domain::{Position, SourceId},
    errors::Error,
    ports::{DestinationTransport, SourceTransport},
};

/// Result of processing a single position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Relayed,
    Skipped(SkipReason),
    /// Fetch failed for a reason other than rate limiting.
    FetchFailed,
    /// Destination rejected the payload.
    SendFailed,
    /// Remote asked us to back off; the same position must be retried.
    RateLimited(Duration),
}

#[derive(Clone)]
pub struct Relay {
    source: Arc<dyn SourceTransport>,
    destination: Arc<dyn DestinationTransport>,
}

impl Relay {
    pub fn new(
        source: Arc<dyn SourceTransport>,
        destination: Arc<dyn DestinationTransport>,
    ) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> &Arc<dyn SourceTransport> {
        &self.source
    }

    pub async fn step(&self, source: SourceId, position: Position) -> Step {
        let msg = match self.source.fetch_message(source, position).await {
            Ok(m) => m,
            Err(Error::RateLimited(wait)) => return Step::RateLimited(wait),
            Err(e) => {
                tracing::warn!(%source, %position, "fetch failed: {e}");
                return Step::FetchFailed;
            }
        };

        if let Verdict::Skip(reason) = classify(msg.as_ref()) {
            if !reason.is_gap() && reason != SkipReason::NoMedia {
                tracing::info!(%source, %position, reason = reason.as_str(), "skipped");
            }
            return Step::Skipped(reason);
        }

        let Some(media) = msg.as_ref().and_then(|m| m.media.as_ref()) else {
            return Step::Skipped(SkipReason::NoMedia);
        };

        match self.destination.relay_media(media).await {
            Ok(()) => {
                tracing::info!(%source, %position, "relayed");
                Step::Relayed
            }
            Err(Error::RateLimited(wait)) => Step::RateLimited(wait),
            Err(e) => {
                tracing::warn!(%source, %position, "send failed: {e}");
                Step::SendFailed
            }
        }
    }
}

/// Sleep for `dur`, returning early if `cancel` fires.
pub(crate) async fn pause(dur: Duration, cancel: &CancellationToken) {
    if dur.is_zero() {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(dur) => {}
    }
}
