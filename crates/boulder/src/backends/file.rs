//! 📂 File backends: a queue you can `cat`, and a sink you can `diff`.
//!
//! [`FileQueue`] replays a newline-delimited dump of the failed-writes topic,
//! one queued record per line, exactly as the consumer would have handed them
//! over. [`FileSink`] is the dry run: instead of POSTing, it writes down what it
//! *would* have POSTed, address and body, so you can eyeball a run before
//! pointing it at production.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::{File, OpenOptions},
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt},
};
use tracing::trace;

use crate::backends::{QueueConsumer, Sink, WriteReceipt, write_address};
use crate::common::Batch;
use crate::error::{QueueError, SinkError};

// -- 📂 FileQueueConfig: config lives next to the backend that uses it. Ethos pattern, baby. 🎯
#[derive(Debug, Deserialize, Clone)]
pub struct FileQueueConfig {
    pub file_name: String,
}

/// 📏 Splits a byte stream into lines, keeping any half-read line between calls.
///
/// The partial line lives on the struct, not on the stack of `next_line`, so a caller
/// that drops the future mid-read (an idle timeout, say) loses nothing: the next call
/// carries on from the bytes already taken off the reader.
struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            line_number: 0,
        }
    }

    /// Next non-blank line without its `\n` / `\r\n`, or `None` at end of input.
    async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            let bytes_read = self.reader.read_until(b'\n', &mut self.pending).await?;
            let at_eof = bytes_read == 0;
            if at_eof && self.pending.is_empty() {
                return Ok(None);
            }

            let mut line = std::mem::take(&mut self.pending);
            self.line_number += 1;
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                if at_eof {
                    return Ok(None);
                }
                continue;
            }
            return Ok(Some(line));
        }
    }
}

/// 📂 Reads a topic dump line by line. Each non-blank line is one record payload.
///
/// Lines are read as raw bytes, not `String`s: a line that is not UTF-8 must reach the
/// validator intact so it can be rejected there, not blow up the read here.
pub struct FileQueue {
    lines: LineReader<io::BufReader<File>>,
    config: FileQueueConfig,
}

impl std::fmt::Debug for FileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileQueue")
            .field("config", &self.config)
            .field("line_number", &self.lines.line_number)
            .field("pending_bytes", &self.lines.pending.len())
            .finish()
    }
}

impl FileQueue {
    pub async fn new(config: FileQueueConfig) -> Result<Self> {
        // -- 💀 the door to the dump would not budge. missing file, wrong cwd, or a permissions power trip.
        let file_handle = File::open(&config.file_name).await.context(format!(
            "💀 The queue dump '{}' would not open. We knocked. We checked the path (relative paths \
             are relative to where you ran this, not where the config lives). The door stayed shut.",
            config.file_name
        ))?;
        Ok(Self {
            lines: LineReader::new(io::BufReader::new(file_handle)),
            config,
        })
    }
}

#[async_trait]
impl QueueConsumer for FileQueue {
    async fn next_record(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        // 🏁 None is EOF. The dump is a finished topic; nothing more will ever arrive.
        let line = self.lines.next_line().await?;
        if let Some(line) = &line {
            trace!(
                "📖 line {} of '{}': {} bytes",
                self.lines.line_number,
                self.config.file_name,
                line.len()
            );
        }
        Ok(line)
    }
}

// -- 🚰 FileSinkConfig: cousin of FileQueueConfig, equally traumatized by disk full errors.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub file_name: String,
}

/// 🚰 Dry-run sink. Appends `# POST <address>` and then the request body for every batch.
///
/// ⚠️ The file is truncated on open. Output is always fresh, one run per file.
#[derive(Debug)]
pub struct FileSink {
    file_buf: io::BufWriter<File>,
    precision: String,
}

impl FileSink {
    pub async fn new(config: FileSinkConfig, precision: &str) -> Result<Self> {
        let file_handle = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.file_name)
            .await
            .context(format!(
                "💀 The dry-run file '{}' could not be conjured into existence. \
                 One of us was wrong about whether the parent directory existed. It was us.",
                config.file_name
            ))?;
        Ok(Self {
            file_buf: io::BufWriter::new(file_handle),
            precision: precision.to_string(),
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&mut self, batch: Batch) -> Result<WriteReceipt, SinkError> {
        if batch.is_empty() {
            return Ok(WriteReceipt::Skipped);
        }
        // -- same address the HTTP sink would use, so a dry run fails where a real one would
        let address = write_address(batch.key(), &self.precision)?;
        let record = format!("# POST {}\n{}\n", address, batch.body());
        self.file_buf.write_all(record.as_bytes()).await?;
        Ok(WriteReceipt::Delivered {
            lines: batch.len(),
            status: None,
        })
    }

    /// 🗑️ Without this flush the last batches sit in the BufWriter, warm and cozy, never on disk.
    async fn flush(&mut self) -> Result<()> {
        self.file_buf
            .flush()
            .await
            .context("💀 Error flushing the dry-run file. The bytes are still in memory. The disk remains unwritten.")
    }
}
