use async_trait::async_trait;

use crate::{
    domain::{Media, MessageDescriptor, Position, SourceId, SourceRef},
    links::ChannelLink,
    progress::JobEvent,
    Result,
};

/// Read side of the message transport (the user-account session).
///
/// Any method may fail with `Error::RateLimited`; the engine suspends and
/// retries on that variant and treats every other error as a skip.
#[async_trait]
pub trait SourceTransport: Send + Sync {
    async fn resolve(&self, link: &ChannelLink) -> Result<SourceRef>;

    /// `Ok(None)` means the position is a gap (deleted or never existed).
    async fn fetch_message(
        &self,
        source: SourceId,
        position: Position,
    ) -> Result<Option<MessageDescriptor>>;

    async fn fetch_latest(&self, source: SourceId) -> Result<Option<MessageDescriptor>>;

    /// Newest-first listing, used only for the progress estimate.
    async fn recent_messages(
        &self,
        source: SourceId,
        limit: usize,
    ) -> Result<Vec<MessageDescriptor>>;
}

/// Write side: the fixed destination stream.
#[async_trait]
pub trait DestinationTransport: Send + Sync {
    /// Re-send the media with no caption and no forward attribution.
    async fn relay_media(&self, media: &Media) -> Result<()>;
}

/// Best-effort progress channel back to the operator. Errors are ignored by
/// the engine.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, event: &JobEvent) -> Result<()>;
}

/// Sink that drops everything (startup-resumed monitors, tests).
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn report(&self, _event: &JobEvent) -> Result<()> {
        Ok(())
    }
}
