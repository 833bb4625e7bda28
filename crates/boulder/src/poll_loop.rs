//! 🔄 The poll loop: one run, start to finish.
//!
//! 🎬 *[the queue mumbles a record.]* *[the validator squints at it.]*
//! *[the grouper files it.]* *[the sink hauls whatever is ready up the hill.]*
//! *[repeat until the queue goes quiet, or the run hits its ceiling.]*
//!
//! Strictly sequential: poll, validate, group, send, then poll again. Every send is
//! awaited before the next poll, so a slow endpoint slows the consumer instead of
//! piling batches up in memory.
//!
//! How a run ends:
//! - nothing arrives for `idle_timeout_secs`, or the queue reports it is drained:
//!   flush the leftovers, done.
//! - the chunk ceiling is reached: the grouper already flushed, stop polling.
//! - the queue returns a non-benign error: abort on the spot. Buffered records are
//!   NOT flushed; they were never acknowledged, so the queue still has them.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::app_config::RunConfig;
use crate::backends::{QueueConsumer, Sink, WriteReceipt};
use crate::grouper::{Admission, GroupPoll, Grouper, RunLimits};
use crate::progress::{RunEnd, RunProgress, RunSummary};
use crate::validator::validate;

/// 🪨 Owns a queue consumer and a sink, and pushes one to the other, one run at a time.
///
/// Runs are sequential and independent: each [`PollLoop::run`] starts a fresh grouper,
/// so nothing buffered leaks from one run into the next.
#[derive(Debug)]
pub struct PollLoop<Q, S> {
    consumer: Q,
    sink: S,
    limits: RunLimits,
    idle_timeout: Duration,
    normalize: bool,
}

impl<Q: QueueConsumer, S: Sink> PollLoop<Q, S> {
    pub fn new(consumer: Q, sink: S, config: &RunConfig) -> Result<Self> {
        let (limits, corrected) = RunLimits::new(config.batch_size, config.chunk_size)
            .context("💀 The [runtime] limits do not describe a run anyone could finish")?;
        if corrected {
            warn!(
                "⚠️ chunk_size {} is below batch_size {}; using {} so at least one full batch fits in a run",
                config.chunk_size,
                config.batch_size,
                limits.chunk_size()
            );
        }
        Ok(Self {
            consumer,
            sink,
            limits,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            normalize: config.normalize,
        })
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    pub fn consumer(&self) -> &Q {
        &self.consumer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 🚀 One run. Returns the summary, or the fatal queue error that cut it short.
    pub async fn run(&mut self, mut progress: RunProgress) -> Result<RunSummary> {
        let mut grouper = Grouper::new(self.limits);
        info!(
            "🚀 Starting run: batch_size={}, chunk_size={}, idle_timeout={:?}, normalize={}",
            self.limits.batch_size(),
            self.limits.chunk_size(),
            self.idle_timeout,
            self.normalize
        );

        let ended_by = loop {
            let polled = match timeout(self.idle_timeout, self.consumer.next_record()).await {
                Ok(polled) => polled,
                Err(_) => {
                    debug!("💤 Nothing for {:?}; calling it a run", self.idle_timeout);
                    break RunEnd::IdleTimeout;
                }
            };

            let payload = match polled {
                Ok(Some(payload)) => payload,
                Ok(None) => break RunEnd::QueueDrained,
                Err(signal) if signal.is_benign() => {
                    debug!("📭 {}", signal);
                    continue;
                }
                Err(fatal) => {
                    error!("💀 Queue error, aborting run: {}", fatal);
                    progress.abandon();
                    return Err(anyhow::Error::new(fatal).context(format!(
                        "💀 The queue gave up on us after {} records. Whatever was still buffered \
                         was never acknowledged, so it is still waiting in the queue.",
                        grouper.processed()
                    )));
                }
            };

            let record = match validate(&payload, self.normalize) {
                Ok(record) => record,
                Err(rejection) => {
                    warn!("⚠️ Skipping record: {}", rejection);
                    progress.record_skipped();
                    continue;
                }
            };

            if let Admission::Accepted {
                progress_checkpoint: true,
            } = grouper.push(record)
            {
                progress.checkpoint(grouper.processed());
            }

            self.dispatch_ready(&mut grouper, &mut progress).await;

            if grouper.is_complete() {
                break RunEnd::ChunkCeiling;
            }
        };

        grouper.finish();
        self.dispatch_ready(&mut grouper, &mut progress).await;

        if let Err(err) = self.sink.flush().await {
            progress.abandon();
            return Err(err.context("💀 The sink could not flush at the end of the run"));
        }

        let processed = grouper.processed();
        info!("✅ Run finished ({}): {} records processed", ended_by, processed);
        Ok(progress.finish(processed, ended_by))
    }

    /// 📤 Hand every ready batch to the sink. A failed send is logged and the batch dropped.
    async fn dispatch_ready(&mut self, grouper: &mut Grouper, progress: &mut RunProgress) {
        while let GroupPoll::Ready(batch) = grouper.next() {
            let lines = batch.len();
            let key = batch.key().clone();
            match self.sink.send(batch).await {
                Ok(WriteReceipt::Delivered { lines, status }) => {
                    debug!("📡 {} lines to {} ({:?})", lines, key, status);
                    progress.batch_delivered(lines);
                }
                Ok(WriteReceipt::Skipped) => {}
                Err(err) => {
                    error!("💀 Dropping batch of {} lines for {}: {}", lines, key, err);
                    progress.batch_dropped(lines);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryQueue, InMemorySink};
    use crate::common::Batch;
    use crate::error::{QueueError, SinkError};
    use async_trait::async_trait;

    fn payload(write_path: &str, message: &str) -> Vec<u8> {
        serde_json::json!({
            "WritePath": write_path,
            "Message": message,
            "TSDName": "metrics",
            "TSDOrg": "acme",
        })
        .to_string()
        .into_bytes()
    }

    fn run_config(batch_size: usize, chunk_size: usize) -> RunConfig {
        RunConfig {
            batch_size,
            chunk_size,
            ..RunConfig::default()
        }
    }

    fn shape(batches: &[Batch]) -> Vec<(String, Vec<String>)> {
        batches
            .iter()
            .map(|b| (b.key().write_path.clone(), b.messages().to_vec()))
            .collect()
    }

    #[derive(Debug, Default)]
    struct FlakySink {
        calls: usize,
        landed: Vec<Batch>,
    }

    #[async_trait]
    impl Sink for FlakySink {
        async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(SinkError::Rejected {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "come back later".into(),
                });
            }
            let lines = batch.len();
            self.landed.push(batch);
            Ok(WriteReceipt::Delivered {
                lines,
                status: None,
            })
        }

        async fn flush(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn the_one_where_five_records_become_three_batches_and_the_run_ends() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            payload("http://a", "m1"),
            payload("http://a", "m2"),
            payload("http://a", "m3"),
            payload("http://b", "m4"),
            payload("http://b", "m5"),
            payload("http://c", "m6"),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(2, 5))?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(
            shape(&sink.batches().await),
            vec![
                ("http://a".to_string(), vec!["m1".to_string(), "m2".to_string()]),
                ("http://a".to_string(), vec!["m3".to_string()]),
                ("http://b".to_string(), vec!["m4".to_string(), "m5".to_string()]),
            ]
        );
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.ended_by, RunEnd::ChunkCeiling);
        // 🧪 the ceiling stops polling; m6 is still waiting for the next run
        assert_eq!(poll_loop.consumer().remaining(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bad_records_are_skipped_not_fatal() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            b"not json at all".to_vec(),
            payload("http://a", "cpu v=1"),
            vec![0xff, 0xfe, 0xfd],
            br#"{"WritePath":"","Message":"cpu v=2"}"#.to_vec(),
            payload("http://a", ",host=x v=3"),
            payload("http://a", "cpu v=4"),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(10, 100))?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.skipped, 4);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.ended_by, RunEnd::QueueDrained);
        assert_eq!(
            shape(&sink.batches().await),
            vec![(
                "http://a".to_string(),
                vec!["cpu v=1".to_string(), "cpu v=4".to_string()]
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_end_of_partition_is_just_a_shrug() -> Result<()> {
        let queue = InMemoryQueue::new([
            Ok(payload("http://a", "m1")),
            Err(QueueError::PartitionEof {
                partition: 0,
                offset: 41,
            }),
            Ok(payload("http://a", "m2")),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(10, 100))?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.processed, 2);
        assert_eq!(sink.batches().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_broker_error_ends_everything_without_a_flush() -> Result<()> {
        let queue = InMemoryQueue::new([
            Ok(payload("http://a", "m1")),
            Err(QueueError::Broker("all brokers down".into())),
            Ok(payload("http://a", "m2")),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(10, 100))?;

        let result = poll_loop.run(RunProgress::hidden()).await;

        let err = result.expect_err("💀 a broker error must abort the run");
        assert!(
            err.chain()
                .any(|cause| cause.to_string().contains("all brokers down"))
        );
        // 🧪 m1 was buffered and stays unsent
        assert!(sink.batches().await.is_empty());
        assert_eq!(poll_loop.consumer().remaining(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_full_batch_ships_before_the_broker_falls_over() -> Result<()> {
        let queue = InMemoryQueue::new([
            Ok(payload("http://a", "m1")),
            Ok(payload("http://a", "m2")),
            Ok(payload("http://a", "m3")),
            Err(QueueError::Broker("all brokers down".into())),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(2, 100))?;

        let result = poll_loop.run(RunProgress::hidden()).await;

        assert!(result.is_err());
        // 🧪 [m1, m2] went out the moment it was full; m3 was still buffered when the queue died
        assert_eq!(
            shape(&sink.batches().await),
            vec![(
                "http://a".to_string(),
                vec!["m1".to_string(), "m2".to_string()]
            )]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_queue_goes_quiet_and_the_leftovers_still_ship() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            payload("http://a", "m1"),
            payload("http://b", "m2"),
        ])
        .held_open();
        let sink = InMemorySink::new();
        let config = RunConfig {
            idle_timeout_secs: 30,
            ..run_config(10, 100)
        };
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &config)?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.ended_by, RunEnd::IdleTimeout);
        assert_eq!(
            shape(&sink.batches().await),
            vec![
                ("http://a".to_string(), vec!["m1".to_string()]),
                ("http://b".to_string(), vec!["m2".to_string()]),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_queue_sends_nothing() -> Result<()> {
        let queue = InMemoryQueue::from_payloads(Vec::<Vec<u8>>::new());
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &RunConfig::default())?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.batches_delivered, 0);
        assert!(sink.batches().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_tiny_chunk_is_lifted_to_one_batch() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            payload("http://a", "m1"),
            payload("http://a", "m2"),
            payload("http://a", "m3"),
            payload("http://a", "m4"),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(3, 1))?;
        assert_eq!(poll_loop.limits().chunk_size(), 3);

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.ended_by, RunEnd::ChunkCeiling);
        assert_eq!(sink.batches().await[0].len(), 3);
        assert_eq!(poll_loop.consumer().remaining(), 1);
        Ok(())
    }

    #[test]
    fn the_one_where_a_zero_batch_size_is_refused() {
        let result = PollLoop::new(
            InMemoryQueue::default(),
            InMemorySink::new(),
            &run_config(0, 10),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn the_one_where_a_failed_write_is_counted_and_the_run_moves_on() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            payload("http://a", "m1"),
            payload("http://a", "m2"),
            payload("http://b", "m3"),
            payload("http://b", "m4"),
        ]);
        let mut poll_loop = PollLoop::new(queue, FlakySink::default(), &run_config(2, 100))?;

        let summary = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(summary.batches_dropped, 1);
        assert_eq!(summary.lines_dropped, 2);
        assert_eq!(summary.batches_delivered, 1);
        assert_eq!(
            shape(&poll_loop.sink().landed),
            vec![(
                "http://b".to_string(),
                vec!["m3".to_string(), "m4".to_string()]
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_back_to_back_runs_start_from_scratch() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([
            payload("http://a", "m1"),
            payload("http://a", "m2"),
            payload("http://a", "m3"),
            payload("http://a", "m4"),
        ]);
        let sink = InMemorySink::new();
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &run_config(2, 2))?;

        let first = poll_loop.run(RunProgress::hidden()).await?;
        let second = poll_loop.run(RunProgress::hidden()).await?;
        let third = poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!((first.processed, first.ended_by), (2, RunEnd::ChunkCeiling));
        assert_eq!((second.processed, second.ended_by), (2, RunEnd::ChunkCeiling));
        assert_eq!((third.processed, third.ended_by), (0, RunEnd::QueueDrained));
        assert_eq!(
            shape(&sink.batches().await),
            vec![
                ("http://a".to_string(), vec!["m1".to_string(), "m2".to_string()]),
                ("http://a".to_string(), vec!["m3".to_string(), "m4".to_string()]),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_normalize_turns_the_volume_down() -> Result<()> {
        let queue = InMemoryQueue::from_payloads([payload("http://a", "CPU,Host=X Value=1")]);
        let sink = InMemorySink::new();
        let config = RunConfig {
            normalize: true,
            ..run_config(10, 100)
        };
        let mut poll_loop = PollLoop::new(queue, sink.clone(), &config)?;

        poll_loop.run(RunProgress::hidden()).await?;

        assert_eq!(sink.batches().await[0].messages(), ["cpu,host=x value=1"]);
        Ok(())
    }
}
