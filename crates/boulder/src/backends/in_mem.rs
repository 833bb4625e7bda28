//! # Previously, on Boulder...
//!
//! 🎬 The records were trapped in a queue nobody could run in CI. Someone had
//! to stand in for the broker. Someone had to stand in for the database.
//! Someone had to live entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! [`InMemoryQueue`] plays back a scripted list of payloads and queue signals.
//! [`InMemorySink`] collects every batch behind an `Arc<Mutex<...>>` so callers
//! can inspect what arrived. Great for assertions, great for trust issues.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::backends::{QueueConsumer, Sink, WriteReceipt};
use crate::common::Batch;
use crate::error::{QueueError, SinkError};

/// 📋 Records for a config-driven in-memory queue, one JSON payload string each.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryQueueConfig {
    #[serde(default)]
    pub records: Vec<String>,
}

/// 📦 A queue that knows exactly what it will say, in order, and then stops.
///
/// Once the script runs out it either reports "drained" (`Ok(None)`), or, when
/// [`InMemoryQueue::held_open`] was called, waits forever like a live consumer on a
/// quiet topic so the poll loop's idle timeout has something to time out.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    script: VecDeque<Result<Vec<u8>, QueueError>>,
    hold_open: bool,
}

impl InMemoryQueue {
    pub fn new(script: impl IntoIterator<Item = Result<Vec<u8>, QueueError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            hold_open: false,
        }
    }

    /// 🚀 The common case: nothing but record payloads.
    pub fn from_payloads<P: Into<Vec<u8>>>(payloads: impl IntoIterator<Item = P>) -> Self {
        Self::new(payloads.into_iter().map(|p| Ok(p.into())))
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn next_record(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        match self.script.pop_front() {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(signal)) => Err(signal),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}

/// 🔧 Nothing to configure. The struct exists so `[sink_config.InMemory]` has something to land in.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySinkConfig {}

/// 📦 A sink that never forgets.
///
/// Clone-able because tests need to peek inside after handing the sink to the poll loop.
/// The `Arc` means every clone shares the same Vec.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    pub received: Arc<Mutex<Vec<Batch>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📸 Snapshot of everything received so far, in arrival order.
    pub async fn batches(&self) -> Vec<Batch> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError> {
        if batch.is_empty() {
            return Ok(WriteReceipt::Skipped);
        }
        let lines = batch.len();
        // 🔒 the one place two owners might collide; the Mutex is load-bearing
        self.received.lock().await.push(batch);
        Ok(WriteReceipt::Delivered {
            lines,
            status: None,
        })
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BatchKey;

    #[tokio::test]
    async fn the_one_where_the_script_plays_in_order_then_drains() {
        let mut queue = InMemoryQueue::new([
            Ok(b"one".to_vec()),
            Err(QueueError::PartitionEof {
                partition: 3,
                offset: 7,
            }),
            Ok(b"two".to_vec()),
        ]);
        assert_eq!(queue.next_record().await.ok().flatten(), Some(b"one".to_vec()));
        assert!(matches!(
            queue.next_record().await,
            Err(QueueError::PartitionEof { partition: 3, .. })
        ));
        assert_eq!(queue.next_record().await.ok().flatten(), Some(b"two".to_vec()));
        assert!(matches!(queue.next_record().await, Ok(None)));
        assert_eq!(queue.remaining(), 0);
    }

    #[tokio::test]
    async fn the_one_where_clones_share_the_same_evidence_locker() {
        let sink = InMemorySink::new();
        let mut handed_off = sink.clone();
        handed_off
            .send(Batch::new(BatchKey::new("http://tsd", "", ""), vec!["x v=1".into()]))
            .await
            .expect("💀 in-memory sends do not fail");
        assert_eq!(sink.batches().await.len(), 1);
    }
}
