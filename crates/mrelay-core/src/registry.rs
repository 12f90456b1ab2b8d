//! Run-control registry: one backfill job per operator.
//!
//! ```text
//!   start ──▶ Active ──stop──▶ Stopped
//!               ▲                 │
//!               └────restart──────┘   (fresh scan from position 1)
//! ```
//!
//! Jobs leave the registry when they complete or hit the gap breaker; their
//! parameters are remembered separately so "restart" keeps working.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Position, SourceRef, UserId},
    progress::{JobEnd, JobProgress},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Active,
    Stopped,
}

/// Where a backfill range ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeEnd {
    At(Position),
    /// Resolved to the source's latest position when the run starts.
    Latest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobParams {
    pub source: SourceRef,
    pub start: Position,
    pub end: RangeEnd,
}

/// Handle given to a running backfill task.
#[derive(Clone, Debug)]
pub struct JobTicket {
    pub owner: UserId,
    pub generation: u64,
    pub params: JobParams,
    pub cancel: CancellationToken,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub params: JobParams,
    pub progress: Option<JobProgress>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartRefusal {
    AlreadyActive,
    NothingToRestart,
}

struct JobEntry {
    state: JobState,
    generation: u64,
    params: JobParams,
    cancel: CancellationToken,
    progress: Option<JobProgress>,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<UserId, JobEntry>,
    remembered: HashMap<UserId, JobParams>,
    next_generation: u64,
}

impl RegistryState {
    fn insert_active(&mut self, owner: UserId, params: JobParams) -> JobTicket {
        self.next_generation += 1;
        let cancel = CancellationToken::new();
        self.jobs.insert(
            owner,
            JobEntry {
                state: JobState::Active,
                generation: self.next_generation,
                params: params.clone(),
                cancel: cancel.clone(),
                progress: None,
            },
        );
        self.remembered.insert(owner, params.clone());
        JobTicket {
            owner,
            generation: self.next_generation,
            params,
            cancel,
        }
    }

    fn is_active(&self, owner: UserId) -> bool {
        self.jobs
            .get(&owner)
            .map(|j| j.state == JobState::Active)
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct JobRegistry {
    state: Mutex<RegistryState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(
        &self,
        owner: UserId,
        params: JobParams,
    ) -> std::result::Result<JobTicket, StartRefusal> {
        let mut st = self.state.lock().await;
        if st.is_active(owner) {
            return Err(StartRefusal::AlreadyActive);
        }
        Ok(st.insert_active(owner, params))
    }

    /// Request cooperative cancellation. Returns `false` if nothing was running.
    pub async fn stop(&self, owner: UserId) -> bool {
        let mut st = self.state.lock().await;
        let Some(job) = st.jobs.get_mut(&owner) else {
            return false;
        };
        if job.state != JobState::Active {
            return false;
        }
        job.cancel.cancel();
        job.state = JobState::Stopped;
        true
    }

    /// Fresh run over the remembered source, always from position 1.
    pub async fn restart(&self, owner: UserId) -> std::result::Result<JobTicket, StartRefusal> {
        let mut st = self.state.lock().await;
        if st.is_active(owner) {
            return Err(StartRefusal::AlreadyActive);
        }
        let Some(params) = st.remembered.get(&owner).cloned() else {
            return Err(StartRefusal::NothingToRestart);
        };
        Ok(st.insert_active(
            owner,
            JobParams {
                start: Position::FIRST,
                ..params
            },
        ))
    }

    pub async fn record_progress(&self, ticket: &JobTicket, progress: &JobProgress) {
        let mut st = self.state.lock().await;
        if let Some(job) = st.jobs.get_mut(&ticket.owner) {
            if job.generation == ticket.generation {
                job.progress = Some(progress.clone());
            }
        }
    }

    /// Called by the run when it ends. Stale generations are ignored.
    pub async fn finish(&self, ticket: &JobTicket, end: JobEnd) {
        let mut st = self.state.lock().await;
        let current = st
            .jobs
            .get(&ticket.owner)
            .map(|j| j.generation == ticket.generation)
            .unwrap_or(false);
        if !current {
            return;
        }
        match end {
            JobEnd::Cancelled => {
                if let Some(job) = st.jobs.get_mut(&ticket.owner) {
                    job.state = JobState::Stopped;
                }
            }
            JobEnd::Exhausted | JobEnd::HistoryEnd => {
                st.jobs.remove(&ticket.owner);
            }
        }
    }

    pub async fn is_active(&self, owner: UserId) -> bool {
        self.state.lock().await.is_active(owner)
    }

    pub async fn snapshot(&self, owner: UserId) -> Option<JobSnapshot> {
        let st = self.state.lock().await;
        st.jobs.get(&owner).map(|j| JobSnapshot {
            state: j.state,
            params: j.params.clone(),
            progress: j.progress.clone(),
        })
    }

    pub async fn remembered(&self, owner: UserId) -> Option<JobParams> {
        self.state.lock().await.remembered.get(&owner).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OP: UserId = UserId(1);

    fn params(start: i64) -> JobParams {
        JobParams {
            source: SourceRef::new(-100, "src"),
            start: Position(start),
            end: RangeEnd::At(Position(500)),
        }
    }

    #[tokio::test]
    async fn second_start_is_refused_while_active() {
        let reg = JobRegistry::new();
        reg.start(OP, params(10)).await.unwrap();
        assert_eq!(
            reg.start(OP, params(20)).await.unwrap_err(),
            StartRefusal::AlreadyActive
        );
        assert!(reg.start(UserId(2), params(20)).await.is_ok());
    }

    #[tokio::test]
    async fn stop_cancels_token_and_marks_stopped() {
        let reg = JobRegistry::new();
        let ticket = reg.start(OP, params(10)).await.unwrap();
        assert!(reg.stop(OP).await);
        assert!(ticket.cancel.is_cancelled());
        assert_eq!(reg.snapshot(OP).await.unwrap().state, JobState::Stopped);
        assert!(!reg.stop(OP).await);
    }

    #[tokio::test]
    async fn restart_always_begins_at_position_one() {
        let reg = JobRegistry::new();
        let first = reg.start(OP, params(300)).await.unwrap();
        reg.stop(OP).await;
        reg.finish(&first, JobEnd::Cancelled).await;

        let again = reg.restart(OP).await.unwrap();
        assert_eq!(again.params.start, Position(1));
        assert_eq!(again.params.end, RangeEnd::At(Position(500)));
        assert_eq!(again.params.source, params(300).source);
        assert!(!again.cancel.is_cancelled());
        assert!(reg.is_active(OP).await);

        // Restarting a restarted job still starts from 1.
        reg.stop(OP).await;
        assert_eq!(reg.restart(OP).await.unwrap().params.start, Position(1));
    }

    #[tokio::test]
    async fn completed_jobs_leave_registry_but_stay_restartable() {
        let reg = JobRegistry::new();
        let ticket = reg.start(OP, params(5)).await.unwrap();
        reg.finish(&ticket, JobEnd::HistoryEnd).await;
        assert!(reg.snapshot(OP).await.is_none());
        assert!(reg.restart(OP).await.is_ok());
    }

    #[tokio::test]
    async fn restart_without_history_is_refused() {
        let reg = JobRegistry::new();
        assert_eq!(
            reg.restart(OP).await.unwrap_err(),
            StartRefusal::NothingToRestart
        );
    }

    #[tokio::test]
    async fn stale_finish_does_not_clobber_newer_run() {
        let reg = JobRegistry::new();
        let old = reg.start(OP, params(5)).await.unwrap();
        reg.stop(OP).await;
        let new = reg.restart(OP).await.unwrap();

        reg.finish(&old, JobEnd::Cancelled).await;
        assert_eq!(reg.snapshot(OP).await.unwrap().state, JobState::Active);

        reg.finish(&new, JobEnd::Exhausted).await;
        assert!(reg.snapshot(OP).await.is_none());
    }
}
