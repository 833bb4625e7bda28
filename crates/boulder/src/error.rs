//! 💀 Typed failures for the three places a run can go sideways.
//!
//! - [`RecordError`]: one record is bad. Skip it, warn, keep going.
//! - [`QueueError`]: the queue spoke. Either it is clearing its throat
//!   ([`QueueError::PartitionEof`]) or the run is over.
//! - [`SinkError`]: one batch did not land. Log it, drop it, keep going.
//!
//! Everything above these seams speaks `anyhow`, like the rest of the crate.

use thiserror::Error;

/// 🚫 Why a single queued record was rejected.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The payload bytes are not UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// The payload is text, but not a JSON record of the expected shape.
    #[error("payload is not a valid record: {0}")]
    Parse(#[from] serde_json::Error),

    /// The record parsed, but a required field is missing or malformed.
    #[error("record failed validation: {0}")]
    Validation(#[from] ValidationError),
}

/// 🔍 Which field let us down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("WritePath is missing or empty")]
    MissingWritePath,
    #[error("Message is missing or empty")]
    EmptyMessage,
    #[error("Message starts with ',' (a line-protocol fragment with no measurement)")]
    MalformedMessage,
}

/// 📬 What the queue can say besides "here is a record".
#[derive(Debug, Error)]
pub enum QueueError {
    /// Reached the current end of a partition. More may arrive later; not an error.
    #[error("reached end of partition {partition} at offset {offset}")]
    PartitionEof { partition: i32, offset: i64 },

    /// Reading from the underlying transport failed.
    #[error("queue read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The broker reported something we cannot recover from.
    #[error("queue broker error: {0}")]
    Broker(String),
}

impl QueueError {
    /// ✅ True for signals the poll loop should shrug off and keep polling through.
    pub fn is_benign(&self) -> bool {
        matches!(self, QueueError::PartitionEof { .. })
    }
}

/// 📡 Why a batch did not make it to its destination.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The record's `WritePath` could not be turned into a request URL.
    #[error("cannot build write address from '{path}': {reason}")]
    InvalidAddress { path: String, reason: String },

    /// The request never got a response (connect, DNS, timeout, ...).
    #[error("write request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered, and the answer was no.
    #[error("write endpoint rejected the batch with {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Capturing the batch locally (dry-run sink) failed.
    #[error("writing batch to file failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_only_partition_eof_is_benign() {
        assert!(
            QueueError::PartitionEof {
                partition: 0,
                offset: 42
            }
            .is_benign()
        );
        assert!(!QueueError::Broker("all brokers down".into()).is_benign());
        assert!(
            !QueueError::Io(std::io::Error::other("disk on fire")).is_benign()
        );
    }
}
