use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::runner::RunState;

/// Events emitted by the runner as files move through the upload/delete cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted { file_count: u64 },
    /// Upload of one archive started.
    FileStarted { index: u64, name: String, total_bytes: u64 },
    /// Bytes of the archive written so far.
    FileProgress { index: u64, completed: u64, total: u64 },
    /// Upload and delete of one archive are done, successfully or not.
    FileFinished { index: u64, name: String, succeeded: bool },
    RunFinished { state: RunState },
}

/// Receives [ProgressEvent]s. Called synchronously from the worker threads.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Terminal progress display: an overall bar counting files plus one byte bar per file
/// currently being uploaded.
pub struct IndicatifProgress {
    mp: MultiProgress,
    overall: ProgressBar,
    files: Mutex<HashMap<u64, ProgressBar>>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        let mp = MultiProgress::new();
        let overall = mp.add(ProgressBar::new(0));
        overall.set_style(Self::overall_style());
        Self {
            mp,
            overall,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn file_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn overall_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/white}] {pos}/{len} files ({elapsed}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for IndicatifProgress {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { file_count } => {
                self.overall.set_length(file_count);
                self.overall.set_position(0);
            },
            ProgressEvent::FileStarted {
                index,
                name,
                total_bytes,
            } => {
                let pb = self.mp.add(ProgressBar::new(total_bytes));
                pb.set_style(Self::file_style());
                pb.set_message(name);
                self.files.lock().insert(index, pb);
            },
            ProgressEvent::FileProgress { index, completed, .. } => {
                if let Some(pb) = self.files.lock().get(&index) {
                    pb.set_position(completed);
                }
            },
            ProgressEvent::FileFinished { index, succeeded, .. } => {
                if let Some(pb) = self.files.lock().remove(&index) {
                    pb.finish_and_clear();
                    self.mp.remove(&pb);
                }
                if !succeeded {
                    self.overall.set_message("(with failures)");
                }
                self.overall.inc(1);
            },
            ProgressEvent::RunFinished { state } => {
                for (_, pb) in self.files.lock().drain() {
                    pb.finish_and_clear();
                }
                self.overall.finish_with_message(format!("{state:?}"));
            },
        }
    }
}
