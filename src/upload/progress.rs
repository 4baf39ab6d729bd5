//! Transfer progress
//!
//! [`ProgressTracker`] holds the counters part tasks write to.
//! [`ProgressReporter`] redraws them on an interval until stopped or dropped.

use super::plan::PartBoundary;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default redraw interval
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

struct PartCounter {
    size: u64,
    read: AtomicU64,
}

/// Byte counters for one multipart transfer.
///
/// Each part's counter has a single writer (its task).
pub struct ProgressTracker {
    total_size: u64,
    total_read: AtomicU64,
    parts: Vec<PartCounter>,
}

impl ProgressTracker {
    pub fn new(parts: &[PartBoundary]) -> Self {
        Self {
            total_size: parts.iter().map(|p| p.part_size).sum(),
            total_read: AtomicU64::new(0),
            parts: parts
                .iter()
                .map(|p| PartCounter {
                    size: p.part_size,
                    read: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    /// Record `delta` bytes read for part `index`
    pub fn record(&self, index: usize, delta: u64) {
        if let Some(part) = self.parts.get(index) {
            part.read.fetch_add(delta, Ordering::Relaxed);
            self.total_read.fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Forget what part `index` has read so far (before a retry)
    pub fn reset(&self, index: usize) {
        if let Some(part) = self.parts.get(index) {
            let previous = part.read.swap(0, Ordering::Relaxed);
            self.total_read.fetch_sub(previous, Ordering::Relaxed);
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn total_read(&self) -> u64 {
        self.total_read.load(Ordering::Relaxed)
    }

    /// Overall completion in percent
    pub fn overall_percent(&self) -> u8 {
        percent(self.total_read(), self.total_size)
    }

    /// Completion of every part in percent, by index
    pub fn part_percents(&self) -> Vec<u8> {
        self.parts
            .iter()
            .map(|p| percent(p.read.load(Ordering::Relaxed), p.size))
            .collect()
    }

    /// One-line summary of parts that are neither pending nor done
    pub fn active_summary(&self) -> String {
        let active: Vec<String> = self
            .part_percents()
            .into_iter()
            .enumerate()
            .filter(|(_, pct)| *pct > 0 && *pct < 100)
            .map(|(i, pct)| format!("#{}:{}%", i + 1, pct))
            .collect();
        let done = self
            .part_percents()
            .iter()
            .filter(|pct| **pct == 100)
            .count();
        format!("{}/{} parts {}", done, self.parts.len(), active.join(" "))
            .trim_end()
            .to_string()
    }
}

fn percent(read: u64, size: u64) -> u8 {
    if size == 0 {
        return 100;
    }
    ((read.min(size) * 100) / size) as u8
}

/// Periodic renderer for a [`ProgressTracker`].
///
/// The redraw task is aborted when the reporter is stopped or dropped.
pub struct ProgressReporter {
    bar: ProgressBar,
    tracker: Arc<ProgressTracker>,
    task: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start redrawing every `interval`. Hidden when `visible` is false.
    pub fn start(tracker: Arc<ProgressTracker>, interval: Duration, visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(tracker.total_size()), target);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }

        let task = {
            let bar = bar.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    render(&bar, &tracker);
                }
            })
        };

        Self {
            bar,
            tracker,
            task: Some(task),
        }
    }

    /// Stop redrawing and leave the final state on screen
    pub fn finish(mut self) {
        self.stop_task();
        render(&self.bar, &self.tracker);
        self.bar.finish_with_message("done");
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop_task();
            self.bar.abandon();
        }
    }
}

fn render(bar: &ProgressBar, tracker: &ProgressTracker) {
    bar.set_position(tracker.total_read());
    bar.set_message(tracker.active_summary());
}
