// src/commands/progress.rs
//! Progress display for setup and update
//!
//! Follows a worker: report lines are printed above an overall progress bar
//! for the module import, with a spinner showing the latest line.

use cms_setup::progress::{ReportLevel, ReportLine};
use cms_setup::{Worker, WorkerState};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Overall bar plus status line for a running worker
pub struct WorkerProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    status: ProgressBar,
}

impl WorkerProgress {
    /// Create a progress display for `operation` (e.g. "Importing")
    pub fn new(operation: &str) -> Self {
        let multi = MultiProgress::new();

        let overall = ProgressBar::new(0);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}%")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        overall.set_message(operation.to_string());

        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .expect("Invalid spinner template"),
        );
        status.enable_steady_tick(Duration::from_millis(100));

        let overall = multi.add(overall);
        let status = multi.add(status);

        Self {
            multi,
            overall,
            status,
        }
    }

    fn show_line(&self, line: &ReportLine) {
        let text = match line.level {
            ReportLevel::Info => line.text.clone(),
            ReportLevel::Warning => format!("warning: {}", line.text),
            ReportLevel::Error => format!("error: {}", line.text),
        };
        // println on a hidden terminal is a no-op, fall back to stdout
        if self.multi.is_hidden() {
            println!("{}", text);
        } else {
            let _ = self.multi.println(&text);
        }
        self.status.set_message(line.text.clone());
    }

    fn set_position(&self, current: u64, total: u64) {
        if total > 0 {
            self.overall.set_length(total);
            self.overall.set_position(current);
        }
    }

    /// Print lines and advance the bar until the worker finishes
    pub fn follow<T: Send + 'static>(&self, worker: &mut Worker<T>) -> cms_setup::Result<T> {
        loop {
            let finished = worker.state() == WorkerState::Finished;
            let lines = worker.poll().to_vec();
            for line in &lines {
                self.show_line(line);
            }
            let (current, total) = worker.log().position();
            self.set_position(current, total);

            if finished {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let seen = worker.log().lines().len();
        let result = worker.join();
        for line in worker.log().since(seen) {
            self.show_line(line);
        }

        match &result {
            Ok(_) => self.overall.finish_with_message("Done"),
            Err(_) => self.overall.abandon_with_message("Failed"),
        }
        self.status.finish_and_clear();
        result
    }
}
