//! Relay engine facade.
//!
//! Owns the job registry, intake sessions and the live tail-monitor table,
//! and wires backfill → checkpoint registration → tail monitoring.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    backfill::BackfillRunner,
    checkpoint::{CheckpointStore, MonitoredSource},
    config::RelayTuning,
    domain::{Position, SourceId, SourceRef, UserId},
    errors::Error,
    intake::{IntakeReply, IntakeSessions, IntakeStep},
    links::parse_link,
    ports::{DestinationTransport, ProgressSink, SourceTransport},
    progress::{JobEnd, JobEvent},
    registry::{JobParams, JobRegistry, JobSnapshot, JobTicket, RangeEnd, StartRefusal},
    relay::{pause, Relay},
    tail::TailMonitor,
    Result,
};

#[derive(Clone)]
pub struct RelayEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    tuning: RelayTuning,
    relay: Relay,
    store: Arc<CheckpointStore>,
    jobs: JobRegistry,
    intake: IntakeSessions,
    monitors: tokio::sync::Mutex<MonitorTable>,
}

#[derive(Default)]
struct MonitorTable {
    slots: HashMap<SourceId, MonitorSlot>,
    next_generation: u64,
}

/// A monitor task stays in the table until it has exited, cancelled or not.
struct MonitorSlot {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorSlot {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl RelayEngine {
    pub fn new(
        source: Arc<dyn SourceTransport>,
        destination: Arc<dyn DestinationTransport>,
        store: Arc<CheckpointStore>,
        tuning: RelayTuning,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                tuning,
                relay: Relay::new(source, destination),
                store,
                jobs: JobRegistry::new(),
                intake: IntakeSessions::new(),
                monitors: tokio::sync::Mutex::new(MonitorTable::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.inner.store
    }

    /// Re-launch a tail monitor for every source in the checkpoint store.
    pub async fn resume_monitors(&self) -> usize {
        let mut launched = 0usize;
        for entry in self.inner.store.entries().await {
            if self.launch_monitor(entry.source).await {
                launched += 1;
            }
        }
        if launched > 0 {
            tracing::info!(monitors = launched, "resumed tail monitors");
        } else {
            tracing::info!("no monitored sources to resume");
        }
        launched
    }

    // ---- run control ----

    pub async fn start_job(
        &self,
        owner: UserId,
        params: JobParams,
        sink: Arc<dyn ProgressSink>,
    ) -> std::result::Result<JoinHandle<()>, StartRefusal> {
        let ticket = self.inner.jobs.start(owner, params).await?;
        Ok(self.spawn_job(ticket, sink))
    }

    /// Fresh scan from position 1 over the operator's last source.
    pub async fn restart_job(
        &self,
        owner: UserId,
        sink: Arc<dyn ProgressSink>,
    ) -> std::result::Result<JoinHandle<()>, StartRefusal> {
        let ticket = self.inner.jobs.restart(owner).await?;
        Ok(self.spawn_job(ticket, sink))
    }

    pub async fn stop_job(&self, owner: UserId) -> bool {
        let stopped = self.inner.jobs.stop(owner).await;
        if stopped {
            tracing::info!(owner = owner.0, "stop requested");
        }
        stopped
    }

    pub async fn job_snapshot(&self, owner: UserId) -> Option<JobSnapshot> {
        self.inner.jobs.snapshot(owner).await
    }

    pub async fn is_job_active(&self, owner: UserId) -> bool {
        self.inner.jobs.is_active(owner).await
    }

    pub async fn remembered_job(&self, owner: UserId) -> Option<JobParams> {
        self.inner.jobs.remembered(owner).await
    }

    fn spawn_job(&self, ticket: JobTicket, sink: Arc<dyn ProgressSink>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_job(ticket, sink).await;
        })
    }

    async fn run_job(&self, ticket: JobTicket, sink: Arc<dyn ProgressSink>) {
        let source = ticket.params.source.clone();
        let end = match ticket.params.end {
            RangeEnd::At(p) => p,
            RangeEnd::Latest => match self.latest_position(source.id, &ticket.cancel).await {
                Some(p) => p,
                None => {
                    tracing::warn!(
                        source = %source.id,
                        "latest position unknown; using gap breaker"
                    );
                    Position(i64::MAX)
                }
            },
        };

        let tracking = TrackingSink {
            engine: self.clone(),
            ticket: ticket.clone(),
            sink: sink.clone(),
        };
        let runner = BackfillRunner::new(self.inner.relay.clone(), self.inner.tuning);
        let outcome = runner
            .run(&source, ticket.params.start, end, &tracking, &ticket.cancel)
            .await;
        self.inner.jobs.finish(&ticket, outcome.end).await;

        if outcome.end == JobEnd::Cancelled {
            return;
        }

        // Seed no further than the source's latest position.
        let seed = match self.latest_position(source.id, &ticket.cancel).await {
            Some(latest) => outcome.final_position.min(latest),
            None => outcome.final_position,
        };
        if let Err(e) = self.inner.store.register(&source, seed).await {
            tracing::error!(source = %source.id, "cannot register checkpoint: {e}");
            return;
        }
        self.launch_monitor(source.clone()).await;

        let checkpoint = self
            .inner
            .store
            .get(source.id)
            .await
            .map(|r| r.position())
            .unwrap_or(seed);
        if let Err(e) = sink
            .report(&JobEvent::MonitoringStarted { source, checkpoint })
            .await
        {
            tracing::debug!("progress report dropped: {e}");
        }
    }

    // ---- intake ----

    pub async fn intake_reset(&self, owner: UserId) {
        self.inner.intake.reset(owner).await;
    }

    pub async fn intake_step(&self, owner: UserId) -> IntakeStep {
        self.inner.intake.step(owner).await
    }

    /// Feed one operator message to the link wizard.
    pub async fn intake_input(&self, owner: UserId, text: &str) -> IntakeReply {
        let step = self.inner.intake.step(owner).await;
        if step == IntakeStep::AwaitEnd && self.inner.jobs.is_active(owner).await {
            // Keep the collected links so the end link can be resent after /stop.
            return IntakeReply::Rejected {
                step,
                reason: "A backfill is already running. Use /stop first.".to_string(),
            };
        }
        if step != IntakeStep::AwaitSource {
            return self.inner.intake.accept_position(owner, text).await;
        }

        match self.resolve_link(text).await {
            Ok(source) => self.inner.intake.accept_source(owner, source).await,
            Err(e) => IntakeReply::Rejected {
                step,
                reason: describe_resolve_error(&e),
            },
        }
    }

    pub async fn resolve_link(&self, text: &str) -> Result<SourceRef> {
        let link = parse_link(text)?;
        self.inner.relay.source().resolve(&link).await
    }

    /// Latest position in the source, waiting out rate limits.
    pub async fn latest_position(
        &self,
        source: SourceId,
        cancel: &CancellationToken,
    ) -> Option<Position> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.inner.relay.source().fetch_latest(source).await {
                Ok(latest) => return latest.map(|m| m.position),
                Err(Error::RateLimited(wait)) => pause(wait, cancel).await,
                Err(e) => {
                    tracing::warn!(%source, "cannot read latest position: {e}");
                    return None;
                }
            }
        }
    }

    // ---- monitors ----

    /// Monitored sources with whether their monitor task is currently live.
    pub async fn monitored(&self) -> Vec<(MonitoredSource, bool)> {
        let entries = self.inner.store.entries().await;
        let monitors = self.inner.monitors.lock().await;
        entries
            .into_iter()
            .map(|e| {
                let live = monitors
                    .slots
                    .get(&e.source.id)
                    .map(MonitorSlot::is_live)
                    .unwrap_or(false);
                (e, live)
            })
            .collect()
    }

    /// Drop a source from monitoring. Returns `false` if it was not monitored.
    pub async fn unmonitor(&self, id: SourceId) -> Result<bool> {
        let removed = self.inner.store.remove(id).await?;
        if let Some(slot) = self.inner.monitors.lock().await.slots.get(&id) {
            slot.cancel.cancel();
        }
        if removed.is_some() {
            tracing::info!(source = %id, "source unmonitored");
        }
        Ok(removed.is_some())
    }

    /// Spawn a tail monitor unless one is already live for this source.
    ///
    /// A cancelled monitor that is still winding down is awaited by its
    /// successor, so at most one monitor per source ever relays.
    pub async fn launch_monitor(&self, source: SourceRef) -> bool {
        let mut monitors = self.inner.monitors.lock().await;
        if monitors.slots.get(&source.id).is_some_and(MonitorSlot::is_live) {
            tracing::debug!(source = %source.id, "tail monitor already running");
            return false;
        }
        let previous = monitors.slots.remove(&source.id).map(|slot| {
            slot.cancel.cancel();
            slot.task
        });

        monitors.next_generation += 1;
        let generation = monitors.next_generation;
        let cancel = CancellationToken::new();
        let id = source.id;
        let engine = self.clone();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Some(previous) = previous {
                    let _ = previous.await;
                }
                let monitor = TailMonitor::new(
                    engine.inner.relay.clone(),
                    engine.inner.store.clone(),
                    engine.inner.tuning,
                );
                monitor.run(source, cancel.clone()).await;
                cancel.cancel();

                let mut monitors = engine.inner.monitors.lock().await;
                if monitors.slots.get(&id).map(|s| s.generation) == Some(generation) {
                    monitors.slots.remove(&id);
                }
            })
        };
        monitors.slots.insert(
            id,
            MonitorSlot {
                generation,
                cancel,
                task,
            },
        );
        true
    }
}

fn describe_resolve_error(e: &Error) -> String {
    match e {
        Error::InvalidLink(reason) => reason.clone(),
        Error::RateLimited(wait) => {
            format!("Rate limited, try again in {}s", wait.as_secs().max(1))
        }
        other => format!("Could not open that channel: {other}"),
    }
}

/// Forwards events to the operator sink and keeps the registry snapshot fresh.
struct TrackingSink {
    engine: RelayEngine,
    ticket: JobTicket,
    sink: Arc<dyn ProgressSink>,
}

#[async_trait]
impl ProgressSink for TrackingSink {
    async fn report(&self, event: &JobEvent) -> Result<()> {
        let progress = match event {
            JobEvent::Started(p) | JobEvent::Progress(p) => Some(p),
            JobEvent::Waiting { progress, .. } | JobEvent::Finished { progress, .. } => {
                Some(progress)
            }
            JobEvent::Estimating { .. } | JobEvent::MonitoringStarted { .. } => None,
        };
        if let Some(p) = progress {
            self.engine.inner.jobs.record_progress(&self.ticket, p).await;
        }
        self.sink.report(event).await
    }
}
