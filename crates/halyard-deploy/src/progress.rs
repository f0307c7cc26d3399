//! Deployment progress reporting.
//!
//! Progress lines are the user-facing trace of a deployment and their
//! wording is part of the external contract; they are emitted
//! synchronously from the apply loop, in change order.

use std::sync::Mutex;

/// Receives one human-readable line per applied (or skipped) change.
pub trait Progress: Send + Sync {
    fn info(&self, message: String);
}

/// Forwards progress lines to the `tracing` pipeline.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn info(&self, message: String) {
        tracing::info!("{message}");
    }
}

/// Prints progress lines to stdout, one per line.
#[derive(Debug, Default)]
pub struct StdoutProgress;

impl Progress for StdoutProgress {
    fn info(&self, message: String) {
        println!("{message}");
    }
}

/// Collects progress lines for inspection, mainly by tests.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    lines: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("progress lock poisoned").clone()
    }
}

impl Progress for RecordingProgress {
    fn info(&self, message: String) {
        self.lines
            .lock()
            .expect("progress lock poisoned")
            .push(message);
    }
}
