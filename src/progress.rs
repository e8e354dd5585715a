// src/progress.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Byte-level progress across concurrent part workers, plus a terminal
//! progress bar that renders it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of an upload's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    /// `round(100 * transferred / total)`, clamped to [0, 100].
    pub percentage: u8,
}

impl ProgressSnapshot {
    fn new(transferred_bytes: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            100
        } else {
            let pct = (transferred_bytes as f64 * 100.0 / total_bytes as f64).round();
            pct.clamp(0.0, 100.0) as u8
        };
        Self {
            transferred_bytes,
            total_bytes,
            percentage,
        }
    }
}

/// One counter per part, indexed by `part_number - 1`.
///
/// Writers overwrite their own counter with the part's cumulative byte count,
/// so there is no cross-part lock; readers sum all counters.
#[derive(Debug)]
pub struct ProgressAggregator {
    counters: Vec<AtomicU64>,
    total_bytes: u64,
}

impl ProgressAggregator {
    pub fn new(part_count: usize, total_bytes: u64) -> Self {
        let counters = (0..part_count).map(|_| AtomicU64::new(0)).collect();
        Self {
            counters,
            total_bytes,
        }
    }

    /// Set the cumulative bytes sent for `part_number`. Unknown parts are ignored.
    pub fn record_part_progress(&self, part_number: u32, transferred_bytes: u64) {
        let Some(idx) = (part_number as usize).checked_sub(1) else {
            return;
        };
        if let Some(counter) = self.counters.get(idx) {
            counter.store(transferred_bytes, Ordering::Relaxed);
        }
    }

    pub fn reset_part(&self, part_number: u32) {
        self.record_part_progress(part_number, 0);
    }

    pub fn part_progress(&self, part_number: u32) -> u64 {
        (part_number as usize)
            .checked_sub(1)
            .and_then(|idx| self.counters.get(idx))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let transferred: u64 = self
            .counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum();
        ProgressSnapshot::new(transferred, self.total_bytes)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Terminal progress bar for an upload, fed from `ProgressSnapshot`s.
#[derive(Clone)]
pub struct UploadProgressBar {
    pub progress_bar: ProgressBar,
    paused: Arc<AtomicBool>,
}

/// Keeps the bar off the terminal until dropped.
pub struct PausedBar<'a> {
    bar: &'a UploadProgressBar,
}

impl Drop for PausedBar<'_> {
    fn drop(&mut self) {
        self.bar
            .progress_bar
            .set_draw_target(ProgressDrawTarget::stderr());
        self.bar.paused.store(false, Ordering::SeqCst);
    }
}

impl UploadProgressBar {
    pub fn new(operation: &str, total_bytes: u64) -> Self {
        let pb = ProgressBar::new(total_bytes);
        let template = format!(
            "{}: {{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] \
             {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, ETA: {{eta}}) {{msg}}",
            operation
        );
        let style = ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);
        Self {
            progress_bar: pb,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// No-op while the bar is paused.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        if self.is_paused() {
            return;
        }
        self.progress_bar.set_position(snapshot.transferred_bytes);
        self.progress_bar.set_message(format!("{}%", snapshot.percentage));
    }

    /// Stop drawing while the terminal is handed to a prompt. No bar lock is
    /// held while the guard lives.
    pub fn pause(&self) -> PausedBar<'_> {
        self.paused.store(true, Ordering::SeqCst);
        self.progress_bar
            .set_draw_target(ProgressDrawTarget::hidden());
        PausedBar { bar: self }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn finish(&self, total_bytes: u64, duration: Duration) {
        let throughput_mbps =
            (total_bytes as f64 / 1_048_576.0) / duration.as_secs_f64().max(f64::EPSILON);
        self.progress_bar.finish_with_message(format!(
            "complete! {:.2} MB in {:.2}s ({:.2} MB/s)",
            total_bytes as f64 / 1_048_576.0,
            duration.as_secs_f64(),
            throughput_mbps
        ));
    }

    pub fn abandon(&self, reason: &str) {
        self.progress_bar.abandon_with_message(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn overwrites_rather_than_adds() {
        let agg = ProgressAggregator::new(2, 200);
        agg.record_part_progress(1, 40);
        agg.record_part_progress(1, 60);
        agg.record_part_progress(2, 100);
        let snap = agg.snapshot();
        assert_eq!(snap.transferred_bytes, 160);
        assert_eq!(snap.percentage, 80);
    }

    #[test]
    fn percentage_rounds_and_clamps() {
        let agg = ProgressAggregator::new(1, 3);
        agg.record_part_progress(1, 2);
        assert_eq!(agg.snapshot().percentage, 67);
        agg.record_part_progress(1, 9);
        assert_eq!(agg.snapshot().percentage, 100);
    }

    #[test]
    fn reset_zeroes_one_part() {
        let agg = ProgressAggregator::new(3, 30);
        for n in 1..=3 {
            agg.record_part_progress(n, 10);
        }
        agg.reset_part(2);
        assert_eq!(agg.part_progress(2), 0);
        assert_eq!(agg.snapshot().transferred_bytes, 20);
    }

    #[test]
    fn out_of_range_parts_are_ignored() {
        let agg = ProgressAggregator::new(1, 10);
        agg.record_part_progress(0, 5);
        agg.record_part_progress(2, 5);
        assert_eq!(agg.snapshot().transferred_bytes, 0);
    }

    #[test]
    fn paused_bar_ignores_updates() {
        let bar = UploadProgressBar::new("UPLOAD", 100);
        let agg = ProgressAggregator::new(1, 100);
        agg.record_part_progress(1, 40);
        {
            let _paused = bar.pause();
            assert!(bar.clone().is_paused());
            bar.update(&agg.snapshot());
            assert_eq!(bar.progress_bar.position(), 0);
        }
        assert!(!bar.is_paused());
        bar.update(&agg.snapshot());
        assert_eq!(bar.progress_bar.position(), 40);
    }

    #[test]
    fn concurrent_writers_sum_exactly() {
        let agg = Arc::new(ProgressAggregator::new(8, 8 * 1000));
        let handles: Vec<_> = (1..=8u32)
            .map(|n| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for b in (0..=1000).step_by(10) {
                        agg.record_part_progress(n, b);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = agg.snapshot();
        assert_eq!(snap.transferred_bytes, 8000);
        assert_eq!(snap.percentage, 100);
    }
}
