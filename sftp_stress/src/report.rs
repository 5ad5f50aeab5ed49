use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use tracing::info;

use crate::error::{ReportError, StressError};
use crate::runner::{Outcome, RunOutcome, RunState, TransferRecord};

/// Min, mean and max of one operation over the records where it completed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperationStats {
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
}

impl OperationStats {
    fn from_durations(durations: impl IntoIterator<Item = Duration>) -> Option<Self> {
        let mut count = 0u32;
        let mut total = Duration::ZERO;
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;
        for d in durations {
            count += 1;
            total += d;
            min = min.min(d);
            max = max.max(d);
        }
        (count > 0).then(|| OperationStats {
            min,
            mean: total / count,
            max,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReportSummary {
    pub count: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Payload bytes over all records.
    pub total_bytes: u64,
    /// Sum of upload and delete time over all records.
    pub total_time: Duration,
    pub upload: Option<OperationStats>,
    pub delete: Option<OperationStats>,
    /// Payload bytes per second over successful uploads.
    pub throughput: Option<f64>,
}

impl ReportSummary {
    pub fn from_records(records: &[TransferRecord]) -> Self {
        let succeeded = records.iter().filter(|r| r.succeeded()).count();
        let uploaded: Vec<&TransferRecord> = records.iter().filter(|r| r.upload_succeeded()).collect();

        let upload_bytes: u64 = uploaded.iter().map(|r| r.size).sum();
        let upload_secs: f64 = uploaded.iter().map(|r| r.upload_time.as_secs_f64()).sum();

        Self {
            count: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            total_bytes: records.iter().map(|r| r.size).sum(),
            total_time: records.iter().map(TransferRecord::transfer_time).sum(),
            upload: OperationStats::from_durations(uploaded.iter().map(|r| r.upload_time)),
            delete: OperationStats::from_durations(
                records.iter().filter(|r| r.succeeded()).filter_map(|r| r.delete_time),
            ),
            throughput: (upload_secs > 0.0).then(|| upload_bytes as f64 / upload_secs),
        }
    }
}

/// The records of one run together with their summary, rendered as plain text.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub records: Vec<TransferRecord>,
    pub state: RunState,
    pub started_at: DateTime<Local>,
    pub abort_reason: Option<String>,
    pub summary: ReportSummary,
}

fn secs(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}

fn stats_line(name: &str, stats: &Option<OperationStats>) -> String {
    match stats {
        Some(s) => format!("{name}: min={} mean={} max={}", secs(s.min), secs(s.mean), secs(s.max)),
        None => format!("{name}: min=n/a mean=n/a max=n/a"),
    }
}

impl RunReport {
    pub fn new(mut records: Vec<TransferRecord>, state: RunState, started_at: DateTime<Local>) -> Self {
        records.sort_by_key(|r| r.index);
        let summary = ReportSummary::from_records(&records);
        Self {
            records,
            state,
            started_at,
            abort_reason: None,
            summary,
        }
    }

    pub fn with_abort_reason(mut self, reason: Option<String>) -> Self {
        self.abort_reason = reason;
        self
    }

    /// Ok for a run that went through every file, even if some transfers failed.
    pub fn result(&self) -> crate::Result<()> {
        match self.state {
            RunState::Aborted => Err(StressError::Aborted(
                self.abort_reason.clone().unwrap_or_else(|| "unknown reason".to_owned()),
            )),
            _ => Ok(()),
        }
    }

    /// `sftp_report_<YYYYmmdd_HHMMSS>.txt`, stamped with the run's start time.
    pub fn file_name(&self) -> String {
        format!("sftp_report_{}.txt", self.started_at.format("%Y%m%d_%H%M%S"))
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "SFTP Test Report")?;
        writeln!(out, "================")?;
        writeln!(
            out,
            "Started: {}  State: {}",
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.state
        )?;
        if let Some(reason) = &self.abort_reason {
            writeln!(out, "Aborted: {reason}")?;
        }
        writeln!(out)?;

        for r in &self.records {
            let status = match &r.outcome {
                Outcome::Success => "OK".to_owned(),
                Outcome::Failed { stage, reason } => format!("FAILED ({stage}: {reason})"),
            };
            let delete = r.delete_time.map(secs).unwrap_or_else(|| "n/a".to_owned());
            writeln!(
                out,
                "File: {} Size: {} bytes Status: {status} Connect: {} Upload: {} Delete: {delete}",
                r.name,
                r.size,
                secs(r.connect_time),
                secs(r.upload_time),
            )?;
        }

        let s = &self.summary;
        writeln!(out)?;
        writeln!(out, "Summary")?;
        writeln!(out, "-------")?;
        writeln!(
            out,
            "count={} succeeded={} failed={} total_bytes={} total_time={}",
            s.count,
            s.succeeded,
            s.failed,
            s.total_bytes,
            secs(s.total_time)
        )?;
        writeln!(out, "{}", stats_line("upload", &s.upload))?;
        writeln!(out, "{}", stats_line("delete", &s.delete))?;
        match s.throughput {
            Some(t) => writeln!(out, "throughput: {t:.0} bytes/s")?,
            None => writeln!(out, "throughput: n/a")?,
        }
        Ok(())
    }

    /// Writes the report into `dir`, creating the directory if needed, and returns the
    /// path of the file.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_text()).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Report written to {path:?}");
        Ok(path)
    }
}

impl From<RunOutcome> for RunReport {
    fn from(outcome: RunOutcome) -> Self {
        RunReport::new(outcome.records, outcome.state, outcome.started_at).with_abort_reason(outcome.abort_reason)
    }
}
