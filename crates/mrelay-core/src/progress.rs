use std::time::Duration;

use crate::domain::{Position, SourceRef};

/// Snapshot of a running or finished backfill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobProgress {
    pub source: SourceRef,
    pub current: Position,
    pub relayed: u64,
    pub skipped: u64,
    /// Rough denominator from the recent-media estimate.
    pub estimated_total: u64,
}

/// How a backfill run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobEnd {
    /// Walked past the end of the requested range.
    Exhausted,
    /// Operator stop observed at the top of an iteration.
    Cancelled,
    /// Too many consecutive gaps; assumed to be the end of history.
    HistoryEnd,
}

/// Events the engine pushes to a `ProgressSink`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobEvent {
    Estimating {
        source: SourceRef,
    },
    Started(JobProgress),
    Progress(JobProgress),
    Waiting {
        progress: JobProgress,
        wait: Duration,
    },
    Finished {
        progress: JobProgress,
        end: JobEnd,
    },
    MonitoringStarted {
        source: SourceRef,
        checkpoint: Position,
    },
}
