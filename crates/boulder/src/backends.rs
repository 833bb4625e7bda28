//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Queue backends pour the failed writes back out, Sink backends push them up the hill again.
//! And in between, the grouper decides who rides together.
//!
//! 🎭 Pattern, same on both ends: trait → concrete impls → enum dispatcher resolved from config.
//! Callers that want their own queue client (a real broker consumer, say) implement
//! [`QueueConsumer`] and hand it straight to [`crate::poll_loop::PollLoop`]; the enums are only
//! the config-driven defaults.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::{Context, Result};

pub mod file;
pub mod in_mem;
pub mod influx;
pub mod queue;
pub mod sink;

pub use file::{FileQueue, FileQueueConfig, FileSink, FileSinkConfig};
pub use in_mem::{InMemoryQueue, InMemoryQueueConfig, InMemorySink, InMemorySinkConfig};
pub use influx::{InfluxSink, InfluxSinkConfig, WRITE_ENDPOINT, write_address};
pub use queue::{QueueBackend, QueueConsumer};
pub use sink::{Sink, SinkBackend, WriteReceipt};

use crate::app_config::{QueueConfig, SinkConfig};

impl QueueBackend {
    /// 🔧 Open whichever queue the config points at.
    pub async fn from_config(config: &QueueConfig) -> Result<Self> {
        Ok(match config {
            QueueConfig::File(file_config) => Self::File(
                FileQueue::new(file_config.clone())
                    .await
                    .context("💀 Could not open the file-backed queue")?,
            ),
            QueueConfig::InMemory(in_mem_config) => {
                Self::InMemory(InMemoryQueue::from_payloads(in_mem_config.records.clone()))
            }
        })
    }
}

impl SinkBackend {
    /// 🔧 Stand up whichever sink the config points at. `precision` rides along on every write URL.
    pub async fn from_config(config: &SinkConfig, precision: &str) -> Result<Self> {
        Ok(match config {
            SinkConfig::Influx(influx_config) => Self::Influx(
                InfluxSink::new(influx_config.clone(), precision)
                    .context("💀 Could not build the HTTP write sink")?,
            ),
            SinkConfig::File(file_config) => Self::File(
                FileSink::new(file_config.clone(), precision)
                    .await
                    .context("💀 Could not open the dry-run sink file")?,
            ),
            SinkConfig::InMemory(_) => Self::InMemory(InMemorySink::new()),
        })
    }
}
