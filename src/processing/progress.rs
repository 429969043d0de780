//! Progress reporting for a pipeline run.
//!
//! Reporters are observers only: the pipeline never reads anything back from them. The
//! [`ProgressTracker`] clamps values to `0..=100` and drops any value lower than the last one
//! reported, so observers always see a non-decreasing sequence.

use std::sync::Mutex;

/// Observer notified as the pipeline reaches milestones.
pub trait ProgressReporter: Send + Sync {
    /// Receive the completion percentage in `0..=100`.
    fn report(&self, percent: u8);
}

impl<F> ProgressReporter for F
where
    F: Fn(u8) + Send + Sync,
{
    fn report(&self, percent: u8) {
        self(percent)
    }
}

/// Reporter that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _percent: u8) {}
}

/// Percentages reported at fixed milestones.
pub(crate) mod milestones {
    pub const INPUT_READ: u8 = 5;
    pub const CHUNKED: u8 = 10;
    pub const MAP_DONE: u8 = 60;
    pub const REDUCE_DONE: u8 = 80;
    pub const REVISION_DONE: u8 = 85;
    pub const FLASHCARDS_DONE: u8 = 92;
    pub const QUIZ_DONE: u8 = 99;
    pub const COMPLETE: u8 = 100;
}

/// Wraps a reporter and enforces monotonic, bounded updates.
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    last: Mutex<Option<u8>>,
}

impl<'a> ProgressTracker<'a> {
    /// Track progress on behalf of `reporter`.
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            last: Mutex::new(None),
        }
    }

    /// Report `percent`, ignoring regressions and repeats.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(*last, Some(previous) if percent <= previous) {
            return;
        }
        *last = Some(percent);
        self.reporter.report(percent);
    }

    /// Report `done` of `total` steps mapped linearly onto `from..=to`.
    pub fn report_fraction(&self, from: u8, to: u8, done: usize, total: usize) {
        if total == 0 {
            self.report(to);
            return;
        }
        let span = usize::from(to.saturating_sub(from));
        let step = span * done.min(total) / total;
        self.report(from.saturating_add(step as u8));
    }
}
