//! 🪨 The Grouper: the only part of this crate with actual opinions.
//!
//! 🎬 *[a queue spills records in whatever order the universe chose.]*
//! *[some are for tenant A. some for tenant B. then A again. then B, B, B.]*
//! *[the grouper sorts nothing. it only decides where one batch ends and the next begins.]*
//!
//! 🧠 The state machine, per record with key `k`:
//! 1. `k` differs from the current key and the buffer is non-empty → flush the buffer.
//! 2. adopt `k`, append the message, count it.
//! 3. count reached the chunk ceiling → flush whatever is buffered, the run is complete.
//! 4. else buffer reached `batch_size` → flush, but KEEP the key.
//!
//! Step 4 keeps the key so a long same-destination run stays one episode; step 1 always
//! flushes so two destinations never share a batch. Both halves are load-bearing.
//!
//! The grouper is pull-based and does no I/O: [`Grouper::push`] feeds it,
//! [`Grouper::next`] drains it, [`Grouper::finish`] tells it the input is over.

use std::collections::VecDeque;

use anyhow::{Result, bail};

use crate::common::{Batch, BatchKey, NormalizedRecord};

/// 📏 Per-run ceilings: records per batch, records per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    batch_size: usize,
    chunk_size: usize,
}

impl RunLimits {
    /// 🔧 Build limits, lifting `chunk_size` up to `batch_size` when it is configured below it.
    ///
    /// Returns the limits and whether the chunk size had to be corrected, so the caller
    /// can complain about it in whatever voice it prefers.
    pub fn new(batch_size: usize, chunk_size: usize) -> Result<(Self, bool)> {
        if batch_size == 0 {
            bail!("💀 batch_size must be at least 1. A batch of zero is just a very expensive no-op.");
        }
        let corrected = chunk_size < batch_size;
        let chunk_size = chunk_size.max(batch_size);
        Ok((
            Self {
                batch_size,
                chunk_size,
            },
            corrected,
        ))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// 📥 What happened to a pushed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Taken. `progress_checkpoint` is true every `batch_size` records past the first batch.
    Accepted { progress_checkpoint: bool },
    /// The chunk ceiling was already reached; the record was not taken or counted.
    RunComplete,
}

/// 📤 What [`Grouper::next`] has for you.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupPoll {
    Ready(Batch),
    /// Nothing ready yet; push more records.
    Pending,
    /// Nothing ready and nothing more will ever be.
    Complete,
}

#[derive(Debug)]
pub struct Grouper {
    limits: RunLimits,
    current_key: Option<BatchKey>,
    buffer: Vec<String>,
    processed: usize,
    ready: VecDeque<Batch>,
    complete: bool,
}

impl Grouper {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            current_key: None,
            buffer: Vec::with_capacity(limits.batch_size),
            processed: 0,
            ready: VecDeque::new(),
            complete: false,
        }
    }

    /// 🔄 Feed one validated record into the state machine.
    pub fn push(&mut self, record: NormalizedRecord) -> Admission {
        if self.complete {
            return Admission::RunComplete;
        }

        let NormalizedRecord { key, message } = record;

        // ⚠️ key change with a non-empty buffer: flush first, always
        if self.current_key.as_ref().is_some_and(|current| *current != key) {
            self.flush();
        }

        self.current_key = Some(key);
        self.buffer.push(message);
        self.processed += 1;

        if self.processed >= self.limits.chunk_size {
            self.flush();
            self.complete = true;
        } else if self.buffer.len() >= self.limits.batch_size {
            // -- key stays put; the next record may well continue the same run
            self.flush();
        }

        Admission::Accepted {
            progress_checkpoint: self.processed > self.limits.batch_size
                && self.processed % self.limits.batch_size == 0,
        }
    }

    /// 📤 Pull the next finished batch, oldest first.
    pub fn next(&mut self) -> GroupPoll {
        match self.ready.pop_front() {
            Some(batch) => GroupPoll::Ready(batch),
            None if self.complete => GroupPoll::Complete,
            None => GroupPoll::Pending,
        }
    }

    /// 🏁 End of input: flush the leftovers (any size, even one), reset, and close the run.
    pub fn finish(&mut self) {
        self.flush();
        self.current_key = None;
        self.complete = true;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Some(key) = &self.current_key {
            let messages = std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.limits.batch_size),
            );
            self.ready.push_back(Batch::new(key.clone(), messages));
        }
    }
}
