use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{file, in_mem, influx};
use crate::common::Batch;
use crate::error::SinkError;

/// 🧾 What a sink says after a send attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReceipt {
    /// The batch landed. `status` is the transport's answer, when there is a transport.
    Delivered {
        lines: usize,
        status: Option<reqwest::StatusCode>,
    },
    /// Empty batch; nothing was sent.
    Skipped,
}

/// 🕳️ A sink that takes one finished batch and makes exactly one write out of it.
///
/// # Contract 📜
/// - `send` consumes the batch. Success or failure, the batch is gone afterwards.
///   No retry lives here. Retries are the caller's problem, and the caller declined.
/// - An empty batch is a no-op that returns [`WriteReceipt::Skipped`].
/// - `flush` runs at the end of every run. Sinks that buffer must empty themselves there.
///
/// Ancient proverb: "He who puts grouping logic in the Sink, debugs in production."
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError>;
    async fn flush(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink: a polymorphic casting call for write destinations.
///
/// The enum dispatches to the inner concrete type, keeping the poll loop blissfully
/// ignorant of whether the data is going over HTTP, onto disk, or into a test's Vec.
#[derive(Debug)]
pub enum SinkBackend {
    Influx(influx::InfluxSink),
    File(file::FileSink),
    InMemory(in_mem::InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError> {
        match self {
            SinkBackend::Influx(sink) => sink.send(batch).await,
            SinkBackend::File(sink) => sink.send(batch).await,
            SinkBackend::InMemory(sink) => sink.send(batch).await,
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            SinkBackend::Influx(sink) => sink.flush().await,
            SinkBackend::File(sink) => sink.flush().await,
            SinkBackend::InMemory(sink) => sink.flush().await,
        }
    }
}
