//! 🪨 boulder: pushes failed metric writes back up the hill.
//!
//! When a time-series write fails, the record lands on a queue. This crate reads that
//! queue, regroups the records by destination, and re-writes them in bounded batches.
//!
//! ```text
//! QueueConsumer ──▶ validate ──▶ Grouper ──▶ Sink
//!     (bytes)      (record)     (batches)   (one write per batch)
//! ```
//!
//! [`run`] does one config-driven pass. Bring your own queue client by implementing
//! [`backends::QueueConsumer`] and driving a [`poll_loop::PollLoop`] directly.

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod grouper;
pub mod poll_loop;
pub mod progress;
pub mod validator;

use crate::app_config::AppConfig;
use crate::backends::{QueueBackend, SinkBackend};
use crate::poll_loop::PollLoop;
use crate::progress::{RunProgress, RunSummary};

/// 🚀 Build the configured backends and run one pass of the poll loop.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    run_with_progress(app_config, RunProgress::new()).await
}

/// 🙈 [`run`], reporting into a reporter of your choosing.
pub async fn run_with_progress(app_config: AppConfig, progress: RunProgress) -> Result<RunSummary> {
    info!("📬 Queue: {:?}", app_config.queue_config);
    let consumer = QueueBackend::from_config(&app_config.queue_config)
        .await
        .context("💀 Failed to open the queue")?;

    info!("📡 Sink: {:?}", app_config.sink_config);
    let sink = SinkBackend::from_config(&app_config.sink_config, &app_config.runtime.precision)
        .await
        .context("💀 Failed to build the sink")?;

    let mut poll_loop = PollLoop::new(consumer, sink, &app_config.runtime)?;
    poll_loop.run(progress).await
}
