use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use error_printer::ErrorPrinter;
use parking_lot::Mutex;
use sftp_client::{Client, Connector, ProgressCallback};
use tracing::{debug, error, info, warn};

use crate::error::StressError;
use crate::generator::{FileGenerator, GeneratedFile};
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::settings::RunSettings;

/// Builds the generator for one worker; the argument is the worker number.
pub type GeneratorFactory = Box<dyn Fn(usize) -> FileGenerator + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Finished,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Delete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Upload => f.write_str("upload"),
            Stage::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed { stage: Stage, reason: String },
}

/// Measurements for one file's upload-then-delete cycle.
#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub index: u64,
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Time spent opening a session for this file; zero when the session is reused.
    pub connect_time: Duration,
    pub upload_time: Duration,
    /// `None` when the delete was never attempted because the upload failed.
    pub delete_time: Option<Duration>,
    pub outcome: Outcome,
}

impl TransferRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn upload_succeeded(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed { stage: Stage::Upload, .. })
    }

    /// Upload plus delete time.
    pub fn transfer_time(&self) -> Duration {
        self.upload_time + self.delete_time.unwrap_or_default()
    }
}

/// Remote name of the archive uploaded in iteration `index`.
pub fn file_name(index: u64) -> String {
    format!("test_{index}.zip")
}

/// What a run produced. Records are sorted by index.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub records: Vec<TransferRecord>,
    pub state: RunState,
    pub started_at: DateTime<Local>,
    pub abort_reason: Option<String>,
}

/// State shared between the workers of one run.
struct SharedRun {
    next_index: AtomicU64,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
    records: Mutex<Vec<TransferRecord>>,
}

impl SharedRun {
    fn new() -> Self {
        Self {
            next_index: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
            records: Mutex::new(Vec::new()),
        }
    }

    fn abort(&self, reason: String) {
        error!("Aborting run: {reason}");
        let mut slot = self.abort_reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// Drives one stress run: for each file, generate an archive, upload it, delete it and
/// time both operations.
///
/// Sessions come from the [Connector]. With `keep_alive` each worker opens one session
/// up front and reuses it; otherwise every file gets its own session. Transfer failures
/// are recorded and the run moves on; a lost connection aborts the whole run.
pub struct Runner<C: Connector> {
    settings: RunSettings,
    connector: C,
    generator_factory: GeneratorFactory,
    progress: Option<Arc<dyn ProgressObserver>>,
    state: RunState,
}

impl<C: Connector> Runner<C> {
    pub fn new(settings: RunSettings, connector: C) -> Self {
        Self {
            settings,
            connector,
            generator_factory: Box::new(|_| FileGenerator::from_os_rng()),
            progress: None,
            state: RunState::Idle,
        }
    }

    pub fn with_generator_factory(mut self, factory: impl Fn(usize) -> FileGenerator + Send + Sync + 'static) -> Self {
        self.generator_factory = Box::new(factory);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run(&mut self) -> RunOutcome {
        self.state = RunState::Running;
        let started_at = Local::now();
        let workers = self.settings.threads.max(1).min(self.settings.file_count.max(1) as usize);
        info!(
            "Starting run against {}: {} files, sizes {:?}, {workers} worker(s), keep_alive = {}",
            self.connector.endpoint(),
            self.settings.file_count,
            self.settings.size_range,
            self.settings.keep_alive
        );
        self.emit(ProgressEvent::RunStarted {
            file_count: self.settings.file_count,
        });

        let shared = SharedRun::new();
        if workers == 1 {
            self.run_worker(0, &shared);
        } else {
            let this = &*self;
            let shared = &shared;
            std::thread::scope(|s| {
                for worker in 0..workers {
                    s.spawn(move || this.run_worker(worker, shared));
                }
            });
        }

        let SharedRun {
            records, abort_reason, ..
        } = shared;
        let mut records = records.into_inner();
        records.sort_by_key(|r| r.index);
        let abort_reason = abort_reason.into_inner();

        self.state = if abort_reason.is_some() {
            RunState::Aborted
        } else {
            RunState::Finished
        };
        info!("Run {}: {} record(s)", self.state, records.len());
        self.emit(ProgressEvent::RunFinished { state: self.state });

        RunOutcome {
            records,
            state: self.state,
            started_at,
            abort_reason,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.on_event(event);
        }
    }

    /// Opens a session and returns it with the time the connect took.
    fn connect(&self, shared: &SharedRun) -> Option<(C::Client, Duration)> {
        let start = Instant::now();
        match self.connector.connect() {
            Ok(client) => Some((client, start.elapsed())),
            Err(e) => {
                shared.abort(StressError::from(e).to_string());
                None
            },
        }
    }

    fn run_worker(&self, worker: usize, shared: &SharedRun) {
        let mut generator = (self.generator_factory)(worker);

        let mut session = None;
        if self.settings.keep_alive {
            match self.connect(shared) {
                Some((client, connect_time)) => {
                    debug!("Worker {worker} connected in {connect_time:?}");
                    session = Some(client);
                },
                None => return,
            }
        }

        while !shared.is_aborted() {
            let index = shared.next_index.fetch_add(1, Ordering::SeqCst);
            if index >= self.settings.file_count {
                break;
            }

            let generated = generator
                .generate(self.settings.size_range.clone())
                .log_error(format!("Generating {} failed", file_name(index)));
            let file = match generated {
                Ok(file) => file,
                Err(e) => {
                    shared.abort(format!("generating {}: {e}", file_name(index)));
                    break;
                },
            };

            let connection_lost = match session.as_mut() {
                Some(client) => self.transfer(client, index, &file, Duration::ZERO, shared),
                None => {
                    let Some((mut client, connect_time)) = self.connect(shared) else {
                        break;
                    };
                    let lost = self.transfer(&mut client, index, &file, connect_time, shared);
                    client.close();
                    lost
                },
            };

            if connection_lost {
                break;
            }

            if let Some(pause) = self.settings.sleep_interval {
                if !shared.is_aborted() && index + 1 < self.settings.file_count {
                    std::thread::sleep(pause);
                }
            }
        }

        if let Some(mut client) = session {
            client.close();
        }
        debug!("Worker {worker} done");
    }

    /// Uploads then deletes one archive and stores its record. Returns true when the
    /// session was lost, after aborting the run.
    fn transfer(
        &self,
        client: &mut C::Client,
        index: u64,
        file: &GeneratedFile,
        connect_time: Duration,
        shared: &SharedRun,
    ) -> bool {
        let name = file_name(index);
        self.emit(ProgressEvent::FileStarted {
            index,
            name: name.clone(),
            total_bytes: file.bytes.len() as u64,
        });

        let callback: Option<ProgressCallback> = self.progress.clone().map(|progress| {
            Arc::new(move |_delta: u64, completed: u64, total: u64| {
                progress.on_event(ProgressEvent::FileProgress { index, completed, total })
            }) as ProgressCallback
        });

        let upload_start = Instant::now();
        let upload = client
            .upload(&name, &file.bytes, callback)
            .warn_error(format!("Upload of {name} failed"));
        let upload_time = upload_start.elapsed();

        let mut delete_time = None;
        let result = match upload {
            Ok(()) => {
                let delete_start = Instant::now();
                let delete = client.delete(&name).warn_error(format!("Delete of {name} failed"));
                delete_time = Some(delete_start.elapsed());
                delete.map_err(|e| (Stage::Delete, e))
            },
            Err(e) => Err((Stage::Upload, e)),
        };

        let (outcome, lost) = match result {
            Ok(()) => (Outcome::Success, None),
            Err((stage, e)) => {
                let lost = e.is_connection_error().then(|| format!("{stage} of {name}: {e}"));
                (
                    Outcome::Failed {
                        stage,
                        reason: e.to_string(),
                    },
                    lost,
                )
            },
        };

        let record = TransferRecord {
            index,
            name: name.clone(),
            size: file.size,
            connect_time,
            upload_time,
            delete_time,
            outcome,
        };
        debug!(?record, "File {index} done");
        let succeeded = record.succeeded();
        shared.records.lock().push(record);
        self.emit(ProgressEvent::FileFinished { index, name, succeeded });

        match lost {
            Some(reason) => {
                shared.abort(reason);
                true
            },
            None => {
                if !succeeded {
                    warn!("File {index} failed; continuing");
                }
                false
            },
        }
    }
}
