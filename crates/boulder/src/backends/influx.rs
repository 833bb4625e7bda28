//! # 📡 THE HTTP WRITE BACKEND
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM, 3:47 AM
//!
//! The time-series database was down for eleven minutes. Eleven minutes of
//! writes, caught by the failed-writes queue like raindrops in a bucket.
//! Now the database is back, and somebody has to pour the bucket back in.
//!
//! 🚀 This module POSTs one batch per request to an influx-compatible
//! `/api/v2/write` endpoint. The destination comes from the batch itself:
//! every record remembers where it was going, so one sink serves every tenant.
//!
//! ⚠️ No retries. A batch that fails here is logged and dropped. If the
//! endpoint is still on fire, the records are gone. That is the deal this
//! tool makes, and the run summary counts every dropped line so nobody can
//! pretend otherwise.
//!
//! 🦆

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::{Sink, WriteReceipt};
use crate::common::{Batch, BatchKey};
use crate::error::SinkError;

/// 🛣️ Appended to every `WritePath`. The influx v2 write API, also spoken by VictoriaMetrics & friends.
pub const WRITE_ENDPOINT: &str = "api/v2/write";

/// 📝 Line protocol is plain text, one point per line.
const LINE_PROTOCOL_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// 📡 HTTP knobs. The URL is not here: each batch carries its own.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InfluxSinkConfig {
    /// 🔌 How long to wait for a TCP handshake before giving up on a destination.
    pub connect_timeout_secs: u64,
    /// ⏱️ How long one write may take end to end.
    pub request_timeout_secs: u64,
}

impl Default for InfluxSinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// 🧭 Build the write URL for a batch key.
///
/// `<write_path>/api/v2/write?precision=<p>[&org=<tsd_org>][&bucket=<tsd_name>]`
///
/// A trailing `/` on the write path is trimmed so we never produce `//api`.
/// Empty org/bucket are left off entirely instead of being sent as `org=`.
pub fn write_address(key: &BatchKey, precision: &str) -> Result<Url, SinkError> {
    let base = format!("{}/{}", key.write_path.trim_end_matches('/'), WRITE_ENDPOINT);
    let mut url = Url::parse(&base).map_err(|e| SinkError::InvalidAddress {
        path: key.write_path.clone(),
        reason: e.to_string(),
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("precision", precision);
        if !key.tsd_org.is_empty() {
            query.append_pair("org", &key.tsd_org);
        }
        if !key.tsd_name.is_empty() {
            query.append_pair("bucket", &key.tsd_name);
        }
    }
    Ok(url)
}

/// 📡 One batch in, one POST out.
#[derive(Debug)]
pub struct InfluxSink {
    client: reqwest::Client,
    precision: String,
}

impl InfluxSink {
    /// 🚀 Build the HTTP client. No connectivity ping: destinations are only known per batch.
    pub fn new(config: InfluxSinkConfig, precision: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Either way: tragic.")?;
        Ok(Self {
            client,
            precision: precision.to_string(),
        })
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError> {
        if batch.is_empty() {
            return Ok(WriteReceipt::Skipped);
        }

        let address = write_address(batch.key(), &self.precision)?;
        let lines = batch.len();
        debug!("📡 Writing {} lines to {}", lines, address);

        let response = self
            .client
            .post(address)
            .header(CONTENT_TYPE, LINE_PROTOCOL_CONTENT_TYPE)
            .body(batch.body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // -- the body usually says which line the database choked on
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }

        trace!("✅ Write landed with {}", status);
        Ok(WriteReceipt::Delivered {
            lines,
            status: Some(status),
        })
    }

    /// 🗑️ Nothing buffered, nothing to flush. The connection pool says goodbye on drop.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
