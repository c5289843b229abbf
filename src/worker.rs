// src/worker.rs

//! Background execution of setup and update
//!
//! A [`Worker`] runs one task on its own named thread. The task receives a
//! [`Reporter`] and a [`CancelToken`]; the owner polls the worker to collect
//! new report lines and eventually joins it for the task's result.

use crate::error::{Error, Result};
use crate::progress::{CancelToken, ProgressEvent, ReportLine, ReportLog, Reporter};
use std::thread::{self, JoinHandle};
use tracing::debug;

type Task<T> = Box<dyn FnOnce(Reporter, CancelToken) -> Result<T> + Send + 'static>;

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running,
    Finished,
}

/// A task running on a background thread
pub struct Worker<T: Send + 'static> {
    name: String,
    task: Option<Task<T>>,
    handle: Option<JoinHandle<Result<T>>>,
    receiver: flume::Receiver<ProgressEvent>,
    reporter: Reporter,
    cancel: CancelToken,
    log: ReportLog,
}

impl<T: Send + 'static> Worker<T> {
    pub fn new<F>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(Reporter, CancelToken) -> Result<T> + Send + 'static,
    {
        let name = name.into();
        let (reporter, receiver) = Reporter::channel(name.clone());
        Self {
            name,
            task: Some(Box::new(task)),
            handle: None,
            receiver,
            reporter,
            cancel: CancelToken::new(),
            log: ReportLog::new(),
        }
    }

    /// Create and start a worker in one step
    pub fn spawn<F>(name: impl Into<String>, task: F) -> Result<Self>
    where
        F: FnOnce(Reporter, CancelToken) -> Result<T> + Send + 'static,
    {
        let mut worker = Self::new(name, task);
        worker.start()?;
        Ok(worker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the task; starting twice is a no-op
    pub fn start(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let reporter = self.reporter.clone();
        let cancel = self.cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("cms-setup-{}", self.name))
            .spawn(move || {
                let result = task(reporter.clone(), cancel);
                match &result {
                    Ok(_) => reporter.finished("Finished"),
                    Err(e) => reporter.failed(e.to_string()),
                }
                result
            })?;

        debug!("Started worker {}", self.name);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn state(&self) -> WorkerState {
        match &self.handle {
            None if self.task.is_some() => WorkerState::NotStarted,
            None => WorkerState::Finished,
            Some(handle) if handle.is_finished() => WorkerState::Finished,
            Some(_) => WorkerState::Running,
        }
    }

    /// Collect pending events; returns the lines added since the last poll
    pub fn poll(&mut self) -> &[ReportLine] {
        let seen = self.log.lines().len();
        self.log.drain(&self.receiver);
        self.log.since(seen)
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        debug!("Cancelling worker {}", self.name);
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Everything reported so far
    pub fn log(&self) -> &ReportLog {
        &self.log
    }

    /// Wait for the task and return its result
    ///
    /// Remaining events are drained into the log first.
    pub fn join(&mut self) -> Result<T> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                return Err(Error::Config(format!(
                    "Worker {} was never started",
                    self.name
                )));
            }
        };

        let result = handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Error::WorkerPanicked(message)
        });
        self.log.drain(&self.receiver);
        result?
    }
}
