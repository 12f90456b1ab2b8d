//! Sequential range backfill.
//!
//! Walks `[start, end]` one position at a time in ascending order. The loop
//! only ends on cancellation, range exhaustion, or the consecutive-gap
//! breaker; every other failure becomes a skip.

use tokio_util::sync::CancellationToken;

use crate::{
    classifier::counts_as_media,
    config::RelayTuning,
    domain::{Position, SourceId, SourceRef},
    ports::ProgressSink,
    progress::{JobEnd, JobEvent, JobProgress},
    relay::{pause, Relay, Step},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub progress: JobProgress,
    pub end: JobEnd,
    /// Last position attempted; seeds the tail checkpoint.
    pub final_position: Position,
}

pub struct BackfillRunner {
    relay: Relay,
    tuning: RelayTuning,
}

impl BackfillRunner {
    pub fn new(relay: Relay, tuning: RelayTuning) -> Self {
        Self { relay, tuning }
    }

    pub async fn run(
        &self,
        source: &SourceRef,
        start: Position,
        end: Position,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BackfillOutcome {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };

        report(
            sink,
            JobEvent::Estimating {
                source: source.clone(),
            },
        )
        .await;
        let estimated_total = self.estimate(source.id, start, end).await;

        let mut progress = JobProgress {
            source: source.clone(),
            current: start,
            relayed: 0,
            skipped: 0,
            estimated_total,
        };
        report(sink, JobEvent::Started(progress.clone())).await;
        tracing::info!(
            source = %source.id,
            name = %source.name,
            %start,
            %end,
            estimated_total,
            "backfill started"
        );

        let mut position = start;
        let mut last_attempted: Option<Position> = None;
        let mut gaps = 0u32;

        let end_reason = loop {
            if cancel.is_cancelled() {
                break JobEnd::Cancelled;
            }
            if self.tuning.max_consecutive_gaps > 0 && gaps >= self.tuning.max_consecutive_gaps {
                break JobEnd::HistoryEnd;
            }
            if position > end {
                break JobEnd::Exhausted;
            }

            progress.current = position;
            match self.relay.step(source.id, position).await {
                Step::RateLimited(wait) => {
                    let wait_secs = wait.as_secs();
                    tracing::warn!(source = %source.id, %position, wait_secs, "rate limited");
                    report(
                        sink,
                        JobEvent::Waiting {
                            progress: progress.clone(),
                            wait,
                        },
                    )
                    .await;
                    pause(wait, cancel).await;
                    continue;
                }
                Step::Skipped(reason) => {
                    last_attempted = Some(position);
                    progress.skipped += 1;
                    if reason.is_gap() {
                        gaps += 1;
                    } else {
                        gaps = 0;
                    }
                    position = position.next();
                    continue;
                }
                Step::FetchFailed => {
                    last_attempted = Some(position);
                    progress.skipped += 1;
                    gaps += 1;
                    position = position.next();
                    continue;
                }
                Step::Relayed => {
                    gaps = 0;
                    progress.relayed += 1;
                }
                Step::SendFailed => {
                    gaps = 0;
                    progress.skipped += 1;
                }
            }

            last_attempted = Some(position);
            if position.0 % self.tuning.progress_every.max(1) == 0 {
                report(sink, JobEvent::Progress(progress.clone())).await;
            }
            pause(self.tuning.backfill_delay, cancel).await;
            position = position.next();
        };

        let final_position = last_attempted.unwrap_or_else(|| start.prev());
        progress.current = final_position;
        tracing::info!(
            source = %source.id,
            ?end_reason,
            %final_position,
            relayed = progress.relayed,
            skipped = progress.skipped,
            "backfill finished"
        );
        report(
            sink,
            JobEvent::Finished {
                progress: progress.clone(),
                end: end_reason,
            },
        )
        .await;

        BackfillOutcome {
            progress,
            end: end_reason,
            final_position,
        }
    }

    /// Rough count of media inside the range, from the bounded recent listing.
    async fn estimate(&self, source: SourceId, start: Position, end: Position) -> u64 {
        match self
            .relay
            .source()
            .recent_messages(source, self.tuning.estimate_limit)
            .await
        {
            Ok(msgs) => msgs
                .iter()
                .filter(|m| m.position >= start && m.position <= end)
                .filter(|m| counts_as_media(m))
                .count() as u64,
            Err(e) => {
                tracing::debug!(%source, "media estimate unavailable: {e}");
                0
            }
        }
    }
}

async fn report(sink: &dyn ProgressSink, event: JobEvent) {
    if let Err(e) = sink.report(&event).await {
        tracing::debug!("progress report dropped: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        domain::MediaKind,
        testing::{media, text, FakeDestination, FakeSource, RecordingSink, Scripted},
    };

    fn quick() -> RelayTuning {
        RelayTuning {
            backfill_delay: Duration::ZERO,
            ..RelayTuning::default()
        }
    }

    fn runner(
        src: &Arc<FakeSource>,
        dst: &Arc<FakeDestination>,
        tuning: RelayTuning,
    ) -> BackfillRunner {
        BackfillRunner::new(Relay::new(src.clone(), dst.clone()), tuning)
    }

    fn ten_with_photo_4_and_video_9() -> Vec<crate::domain::MessageDescriptor> {
        (1..=10)
            .map(|p| match p {
                4 => media(4, MediaKind::Photo),
                9 => media(9, MediaKind::Video),
                p => text(p),
            })
            .collect()
    }

    fn source() -> SourceRef {
        SourceRef::new(-100500, "Archive")
    }

    #[tokio::test(start_paused = true)]
    async fn relays_only_eligible_positions() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        let dst = Arc::new(FakeDestination::default());
        let sink = RecordingSink::default();

        let out = runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &sink, &CancellationToken::new())
            .await;

        assert_eq!(out.end, JobEnd::Exhausted);
        assert_eq!(out.progress.relayed, 2);
        assert_eq!(out.progress.skipped, 8);
        assert_eq!(out.final_position, Position(10));
        assert_eq!(dst.sent(), vec!["file-4", "file-9"]);
        assert_eq!(out.progress.estimated_total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reversed_range_behaves_like_normalized_range() {
        let run = |start: i64, end: i64| async move {
            let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
            let dst = Arc::new(FakeDestination::default());
            let out = runner(&src, &dst, quick())
                .run(
                    &source(),
                    Position(start),
                    Position(end),
                    &RecordingSink::default(),
                    &CancellationToken::new(),
                )
                .await;
            (out, src.fetched(), dst.sent())
        };

        let forward = run(2, 9).await;
        let backward = run(9, 2).await;
        assert_eq!(forward, backward);
        assert_eq!(forward.1, (2..=9).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_and_retries_same_position() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        src.script(5, Scripted::RateLimited(Duration::from_secs(30)));
        let dst = Arc::new(FakeDestination::default());
        let sink = RecordingSink::default();

        let started = tokio::time::Instant::now();
        let out = runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &sink, &CancellationToken::new())
            .await;
        let elapsed = started.elapsed();

        assert_eq!(src.fetched(), vec![1, 2, 3, 4, 5, 5, 6, 7, 8, 9, 10]);
        assert_eq!(out.progress.relayed, 2);
        assert_eq!(out.progress.skipped, 8);
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));

        let waits: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Waiting { progress, wait } => Some((progress.current, wait)),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![(Position(5), Duration::from_secs(30))]);
    }

    #[tokio::test(start_paused = true)]
    async fn position_sequence_only_holds_during_rate_limit() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        src.script(3, Scripted::RateLimited(Duration::from_secs(1)));
        src.script(3, Scripted::RateLimited(Duration::from_secs(2)));
        src.script(7, Scripted::Fail);
        let dst = Arc::new(FakeDestination::default());

        runner(&src, &dst, quick())
            .run(
                &source(),
                Position(1),
                Position(10),
                &RecordingSink::default(),
                &CancellationToken::new(),
            )
            .await;

        let seq = src.fetched();
        for pair in seq.windows(2) {
            let step = pair[1] - pair[0];
            assert!(step == 1 || (step == 0 && pair[0] == 3), "bad step {pair:?}");
        }
        assert_eq!(seq.iter().filter(|p| **p == 3).count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_gaps_end_the_run_early() {
        // Media at 1..=4, then nothing until far past the breaker window.
        let msgs = (1..=4).map(|p| media(p, MediaKind::Document)).collect();
        let src = Arc::new(FakeSource::with(msgs));
        let dst = Arc::new(FakeDestination::default());
        let k = 5;

        let out = runner(&src, &dst, quick())
            .run(
                &source(),
                Position(1),
                Position(10_000),
                &RecordingSink::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(out.end, JobEnd::HistoryEnd);
        assert_eq!(out.final_position, Position(k + 99));
        assert_eq!(out.progress.relayed, 4);
        assert_eq!(out.progress.skipped, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn text_messages_reset_the_gap_counter() {
        let tuning = RelayTuning {
            max_consecutive_gaps: 3,
            ..quick()
        };
        // gaps at 1,2 then text at 3, gaps at 4,5 then text at 6: never 3 in a row.
        let src = Arc::new(FakeSource::with(vec![text(3), text(6)]));
        let dst = Arc::new(FakeDestination::default());

        let out = runner(&src, &dst, tuning)
            .run(
                &source(),
                Position(1),
                Position(6),
                &RecordingSink::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(out.end, JobEnd::Exhausted);
        assert_eq!(out.final_position, Position(6));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_observed_at_loop_top() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        let dst = Arc::new(FakeDestination::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &RecordingSink::default(), &cancel)
            .await;

        assert_eq!(out.end, JobEnd::Cancelled);
        assert!(src.fetched().is_empty());
        assert_eq!(out.final_position, Position(0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pacing_stops_after_current_position() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        let dst = Arc::new(FakeDestination::default());
        let cancel = CancellationToken::new();
        let tuning = RelayTuning::default();

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                // First relay (position 4) happens at t=0, its pacing sleep runs 5s.
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            })
        };
        let out = runner(&src, &dst, tuning)
            .run(&source(), Position(1), Position(10), &RecordingSink::default(), &cancel)
            .await;
        stopper.await.unwrap();

        assert_eq!(out.end, JobEnd::Cancelled);
        assert_eq!(out.final_position, Position(4));
        assert_eq!(dst.sent(), vec!["file-4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_cuts_a_rate_limit_wait_short() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        src.script(2, Scripted::RateLimited(Duration::from_secs(600)));
        let dst = Arc::new(FakeDestination::default());
        let cancel = CancellationToken::new();

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            })
        };
        let started = tokio::time::Instant::now();
        let out = runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &RecordingSink::default(), &cancel)
            .await;
        stopper.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(600));
        assert_eq!(out.end, JobEnd::Cancelled);
        assert_eq!(out.final_position, Position(1));
        assert_eq!(src.fetched(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_and_sink_failures_do_not_abort() {
        let src = Arc::new(FakeSource::with(ten_with_photo_4_and_video_9()));
        let dst = Arc::new(FakeDestination::default());
        dst.reject.lock().unwrap().push("file-4".to_string());
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let out = runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &sink, &CancellationToken::new())
            .await;

        assert_eq!(out.end, JobEnd::Exhausted);
        assert_eq!(out.progress.relayed, 1);
        assert_eq!(out.progress.skipped, 9);
        assert!(matches!(
            sink.events().last(),
            Some(JobEvent::Finished { end: JobEnd::Exhausted, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_reported_on_every_fifth_relayed_position() {
        let msgs = (1..=10).map(|p| media(p, MediaKind::Photo)).collect();
        let src = Arc::new(FakeSource::with(msgs));
        let dst = Arc::new(FakeDestination::default());
        let sink = RecordingSink::default();

        runner(&src, &dst, quick())
            .run(&source(), Position(1), Position(10), &sink, &CancellationToken::new())
            .await;

        let ticks: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some((p.current.0, p.relayed)),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![(5, 5), (10, 10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_estimate_counts_as_zero() {
        let src = Arc::new(FakeSource {
            fail_recent: true,
            ..FakeSource::with(ten_with_photo_4_and_video_9())
        });
        let dst = Arc::new(FakeDestination::default());

        let out = runner(&src, &dst, quick())
            .run(
                &source(),
                Position(1),
                Position(10),
                &RecordingSink::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(out.progress.estimated_total, 0);
        assert_eq!(out.progress.relayed, 2);
    }
}
