// src/progress.rs

//! Progress reporting and cancellation for long-running operations
//!
//! Setup and update run on a worker thread. The worker reports what it is
//! doing through a [`Reporter`], which both logs each line through tracing
//! and sends it as a [`ProgressEvent`] over a channel. The caller drains the
//! channel into an append-only [`ReportLog`] whenever it wants to refresh its
//! display.
//!
//! Cancellation is cooperative: [`CancelToken::cancel`] only sets a flag.
//! Workers check it between statements and between modules, so a statement
//! that is already executing runs to completion.
//!
//! # Example
//!
//! ```ignore
//! use cms_setup::progress::{Reporter, ReportLog};
//!
//! let (reporter, receiver) = Reporter::channel("import");
//! reporter.line("Importing org.example.base");
//!
//! let mut log = ReportLog::new();
//! log.drain(&receiver);
//! assert_eq!(log.lines().len(), 1);
//! ```

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Cooperative cancellation flag shared between caller and worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Error::Cancelled` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Events sent from a worker to whoever displays its progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Informational report line
    Message(String),
    /// Something went wrong but the operation continues
    Warning(String),
    /// A step failed
    Error(String),
    /// Overall position changed
    Position { current: u64, total: u64 },
    /// Operation finished successfully
    Finished(String),
    /// Operation ended with an error
    Failed(String),
}

/// Sends progress events and mirrors them to the log
#[derive(Debug, Clone)]
pub struct Reporter {
    name: String,
    sender: Option<flume::Sender<ProgressEvent>>,
}

impl Reporter {
    /// Create a reporter and the receiving end of its channel
    pub fn channel(name: impl Into<String>) -> (Self, flume::Receiver<ProgressEvent>) {
        let (sender, receiver) = flume::unbounded();
        (
            Self {
                name: name.into(),
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Reporter that only writes to the log
    pub fn log_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sender: None,
        }
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // The receiver may be gone when nobody is polling anymore
            let _ = sender.send(event);
        }
    }

    pub fn line(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {}", self.name, message);
        self.send(ProgressEvent::Message(message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", self.name, message);
        self.send(ProgressEvent::Warning(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}: {}", self.name, message);
        self.send(ProgressEvent::Error(message));
    }

    pub fn position(&self, current: u64, total: u64) {
        self.send(ProgressEvent::Position { current, total });
    }

    pub fn finished(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {}", self.name, message);
        self.send(ProgressEvent::Finished(message));
    }

    pub fn failed(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}: FAILED - {}", self.name, message);
        self.send(ProgressEvent::Failed(message));
    }
}

/// Severity of a report line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// One line of the accumulated report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub level: ReportLevel,
    pub text: String,
}

/// Final state recorded in a report log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Finished(String),
    Failed(String),
}

/// Append-only collection of report lines on the polling side
#[derive(Debug, Default)]
pub struct ReportLog {
    lines: Vec<ReportLine>,
    current: u64,
    total: u64,
    outcome: Option<ReportOutcome>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event; returns the new line if the event produced one
    pub fn apply(&mut self, event: ProgressEvent) -> Option<&ReportLine> {
        let (level, text) = match event {
            ProgressEvent::Message(text) => (ReportLevel::Info, text),
            ProgressEvent::Warning(text) => (ReportLevel::Warning, text),
            ProgressEvent::Error(text) => (ReportLevel::Error, text),
            ProgressEvent::Position { current, total } => {
                self.current = current;
                self.total = total;
                return None;
            }
            ProgressEvent::Finished(text) => {
                self.outcome = Some(ReportOutcome::Finished(text.clone()));
                (ReportLevel::Info, text)
            }
            ProgressEvent::Failed(text) => {
                self.outcome = Some(ReportOutcome::Failed(text.clone()));
                (ReportLevel::Error, text)
            }
        };
        self.lines.push(ReportLine { level, text });
        self.lines.last()
    }

    /// Move every pending event from `receiver` into the log
    ///
    /// Returns the number of new lines.
    pub fn drain(&mut self, receiver: &flume::Receiver<ProgressEvent>) -> usize {
        let before = self.lines.len();
        for event in receiver.try_iter() {
            self.apply(event);
        }
        self.lines.len() - before
    }

    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    /// Lines added after the first `seen` lines
    pub fn since(&self, seen: usize) -> &[ReportLine] {
        &self.lines[seen.min(self.lines.len())..]
    }

    /// Number of error lines
    pub fn error_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.level == ReportLevel::Error)
            .count()
    }

    pub fn position(&self) -> (u64, u64) {
        (self.current, self.total)
    }

    pub fn outcome(&self) -> Option<&ReportOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}
