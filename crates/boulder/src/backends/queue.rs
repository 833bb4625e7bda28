use async_trait::async_trait;

use crate::backends::{file, in_mem};
use crate::error::QueueError;

/// 🚰 The queue client seam: one raw record body per call, uninterpreted.
///
/// # Contract 📜
/// - `Ok(Some(bytes))`: one record's payload. Could be garbage. Not our problem here.
/// - `Ok(None)`: the queue is drained for good. The poll loop treats it like an idle timeout.
/// - `Err(e)` with `e.is_benign()`: a signal (end of partition). Keep polling.
/// - any other `Err`: the run is over.
/// - Waiting is allowed. The poll loop wraps every call in its idle timeout, so a live
///   consumer with nothing to say simply never returns and the timer does the rest.
#[async_trait]
pub trait QueueConsumer: std::fmt::Debug + Send {
    async fn next_record(&mut self) -> Result<Option<Vec<u8>>, QueueError>;
}

/// 🎭 The config-resolved queues. Same universal-remote trick as the sinks.
#[derive(Debug)]
pub enum QueueBackend {
    File(file::FileQueue),
    InMemory(in_mem::InMemoryQueue),
}

#[async_trait]
impl QueueConsumer for QueueBackend {
    async fn next_record(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        match self {
            QueueBackend::File(queue) => queue.next_record().await,
            QueueBackend::InMemory(queue) => queue.next_record().await,
        }
    }
}
