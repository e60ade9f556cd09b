//! Progress reporting and cooperative cancellation
//!
//! Long-running tools report through a [`Progress`] sink and poll it for
//! cancellation. Algorithms never talk to a sink directly; they wrap it in a
//! [`ProgressTracker`], which suppresses duplicate updates and turns a raised
//! cancel flag into [`Error::Cancelled`].

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message emitted once when an operation stops on a cancel request
pub const CANCELLED_MESSAGE: &str = "Operation cancelled.";

/// Queue-driven loops poll for cancellation once per this many pops.
pub const POLL_BATCH: usize = 1 << 14;

/// Host-side sink for progress, feedback and cancellation.
pub trait Progress: Send + Sync {
    /// Report completion of the current phase, 0..=100
    fn update(&self, label: &str, percent: i32);

    /// Whether the host asked the running operation to stop
    fn is_cancelled(&self) -> bool {
        false
    }

    /// User-facing message
    fn feedback(&self, message: &str);
}

/// Routes progress to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogProgress {
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an externally owned cancel flag
    pub fn with_cancel_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            cancel_flag: Some(flag),
        }
    }
}

impl Progress for LogProgress {
    fn update(&self, label: &str, percent: i32) {
        tracing::debug!("{}: {}%", label, percent);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn feedback(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Discards everything and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn update(&self, _label: &str, _percent: i32) {}

    fn feedback(&self, _message: &str) {}
}

/// Per-operation view of a [`Progress`] sink.
pub struct ProgressTracker<'a> {
    sink: &'a dyn Progress,
    label: String,
    last_percent: Option<i32>,
    notified: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn Progress, label: impl Into<String>) -> Self {
        Self {
            sink,
            label: label.into(),
            last_percent: None,
            notified: false,
        }
    }

    /// Start a new phase; the next update is always forwarded.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.last_percent = None;
    }

    /// Forward `done / total` as a percentage if it changed.
    pub fn report(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            ((done as f64 / total as f64) * 100.0).min(100.0) as i32
        };
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.sink.update(&self.label, percent);
        }
    }

    /// Poll the sink for cancellation.
    pub fn check(&mut self) -> Result<()> {
        if self.sink.is_cancelled() {
            if !self.notified {
                self.notified = true;
                self.sink.feedback(CANCELLED_MESSAGE);
            }
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Poll, then report. Called once per outer row of a sweep.
    pub fn step(&mut self, done: usize, total: usize) -> Result<()> {
        self.check()?;
        self.report(done, total);
        Ok(())
    }

    /// Like [`step`](Self::step) but only every [`POLL_BATCH`] calls, for
    /// queue-driven loops.
    #[inline]
    pub fn tick(&mut self, done: usize, total: usize) -> Result<()> {
        if done % POLL_BATCH == 0 {
            self.step(done, total)?;
        }
        Ok(())
    }

    /// Forward a message to the sink
    pub fn feedback(&self, message: &str) {
        self.sink.feedback(message);
    }

    /// The wrapped sink, for workers that poll cancellation on their own
    pub fn sink(&self) -> &'a dyn Progress {
        self.sink
    }
}
