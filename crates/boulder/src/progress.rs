//! 📊 progress.rs: "Are we there yet?" Every replay, every time, forever.
//!
//! 🚀 The poll loop gets a [`RunProgress`] handed to it and reports into it: records
//! skipped, batches delivered, batches dropped, the occasional checkpoint. Nothing here
//! is global; a run owns its reporter and turns it into a [`RunSummary`] at the end.
//!
//! ⚠️  Warning: Watching the spinner will not make the queue drain faster.
//! We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::fmt;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 lines" → "1,000,000 lines". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, the outage was worse than anyone admitted in the postmortem.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 🏁 Why a run stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// The queue said it has nothing more, ever.
    QueueDrained,
    /// The run hit its chunk ceiling.
    ChunkCeiling,
}

impl fmt::Display for RunEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RunEnd::IdleTimeout => "idle timeout",
            RunEnd::QueueDrained => "queue drained",
            RunEnd::ChunkCeiling => "chunk ceiling",
        };
        f.write_str(reason)
    }
}

/// 📊 Live counters for one run, plus a spinner so the terminal looks alive.
///
/// # Ancient Proverb
/// "He who replays a queue without counting the drops, replays alone and in darkness."
pub struct RunProgress {
    spinner: ProgressBar,
    skipped: u64,
    batches_delivered: u64,
    lines_delivered: u64,
    batches_dropped: u64,
    lines_dropped: u64,
    start_time: Instant,
}

impl fmt::Debug for RunProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("RunProgress")
            .field("skipped", &self.skipped)
            .field("batches_delivered", &self.batches_delivered)
            .field("batches_dropped", &self.batches_dropped)
            .finish()
    }
}

impl RunProgress {
    /// 🚀 A reporter with a spinner on stderr.
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                // -- hardcoded template; if indicatif ever disagrees, a plain spinner will do
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self::with_spinner(spinner)
    }

    /// 🙈 Same counters, no terminal output. Tests, pipes, and the shy.
    pub fn hidden() -> Self {
        Self::with_spinner(ProgressBar::hidden())
    }

    fn with_spinner(spinner: ProgressBar) -> Self {
        Self {
            spinner,
            skipped: 0,
            batches_delivered: 0,
            lines_delivered: 0,
            batches_dropped: 0,
            lines_dropped: 0,
            start_time: Instant::now(),
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// 📍 Called every `batch_size` records past the first batch.
    pub fn checkpoint(&mut self, processed: usize) {
        info!("📊 Metrics collected: {}", processed);
        self.spinner
            .set_message(format!("{} records processed", format_number(processed as u64)));
    }

    pub fn batch_delivered(&mut self, lines: usize) {
        self.batches_delivered += 1;
        self.lines_delivered += lines as u64;
        self.spinner.tick();
    }

    pub fn batch_dropped(&mut self, lines: usize) {
        self.batches_dropped += 1;
        self.lines_dropped += lines as u64;
    }

    /// 💀 The run died. Leave the spinner where it fell.
    pub fn abandon(self) {
        self.spinner.abandon_with_message("run aborted");
    }

    /// ✅ Close the books on this run.
    pub fn finish(self, processed: usize, ended_by: RunEnd) -> RunSummary {
        self.spinner.finish_and_clear();
        RunSummary {
            processed: processed as u64,
            skipped: self.skipped,
            batches_delivered: self.batches_delivered,
            lines_delivered: self.lines_delivered,
            batches_dropped: self.batches_dropped,
            lines_dropped: self.lines_dropped,
            elapsed: self.start_time.elapsed(),
            ended_by,
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// 🧾 The receipt for one run. `Display` renders it as a borderless table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Records accepted by the grouper.
    pub processed: u64,
    /// Records rejected by the validator.
    pub skipped: u64,
    pub batches_delivered: u64,
    pub lines_delivered: u64,
    /// Batches the sink failed to write. There is no retry; these lines are gone.
    pub batches_dropped: u64,
    pub lines_dropped: u64,
    pub elapsed: Duration,
    pub ended_by: RunEnd,
}

impl RunSummary {
    /// ✅ Every accepted line made it out.
    pub fn is_clean(&self) -> bool {
        self.batches_dropped == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows = [
            ("processed", format_number(self.processed)),
            ("skipped", format_number(self.skipped)),
            (
                "delivered",
                format!(
                    "{} lines in {} batches",
                    format_number(self.lines_delivered),
                    format_number(self.batches_delivered)
                ),
            ),
            (
                "dropped",
                format!(
                    "{} lines in {} batches",
                    format_number(self.lines_dropped),
                    format_number(self.batches_dropped)
                ),
            ),
            ("elapsed", format_duration(self.elapsed)),
            ("ended by", self.ended_by.to_string()),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label).set_alignment(CellAlignment::Right),
                Cell::new(value).set_alignment(CellAlignment::Left),
            ]);
        }
        write!(f, "{}", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(20_000_000), "20,000,000");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hour_column() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn the_one_where_the_books_balance() {
        let mut progress = RunProgress::hidden();
        progress.record_skipped();
        progress.batch_delivered(3);
        progress.batch_delivered(2);
        progress.batch_dropped(4);
        progress.checkpoint(6);

        let summary = progress.finish(9, RunEnd::IdleTimeout);
        assert_eq!(summary.processed, 9);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.batches_delivered, 2);
        assert_eq!(summary.lines_delivered, 5);
        assert_eq!(summary.batches_dropped, 1);
        assert_eq!(summary.lines_dropped, 4);
        assert!(!summary.is_clean());
    }

    #[test]
    fn the_one_where_the_table_tells_the_whole_story() {
        let mut progress = RunProgress::hidden();
        progress.batch_delivered(1500);
        let rendered = progress.finish(1500, RunEnd::ChunkCeiling).to_string();
        assert!(rendered.contains("1,500 lines in 1 batches"));
        assert!(rendered.contains("chunk ceiling"));
        assert!(rendered.contains("0 lines in 0 batches"));
    }
}
