use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Result, SftpClientError};
use crate::interface::{check_remote_name, remote_path, Client, Connector, ProgressCallback};

/// Injected failures. Call indices are zero-based and counted across all sessions.
#[derive(Debug, Default)]
struct FaultPlan {
    refuse_connections: bool,
    fail_uploads: HashSet<u64>,
    fail_deletes: HashSet<u64>,
    drop_on_upload: Option<u64>,
}

#[derive(Debug, Default)]
struct ServerState {
    files: BTreeMap<String, Vec<u8>>,
    faults: FaultPlan,
    latency: Duration,
    connect_calls: u64,
    upload_calls: u64,
    delete_calls: u64,
    open_sessions: u64,
    peak_open_sessions: u64,
}

/// An in-memory stand-in for an SFTP server, for tests and dry runs.
///
/// Clones share the same state, so a test can keep one handle for inspection while the
/// runner opens sessions through another. Failures are injected per call index, e.g.
/// `fail_upload(2)` makes the third upload issued against this server fail.
#[derive(Clone, Debug)]
pub struct MemoryServer {
    remote_dir: String,
    state: Arc<Mutex<ServerState>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryServer {
    pub fn new(remote_dir: impl Into<String>) -> Self {
        Self {
            remote_dir: remote_dir.into(),
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    /// Sleep this long inside every upload and delete.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    pub fn refuse_connections(self) -> Self {
        self.state.lock().faults.refuse_connections = true;
        self
    }

    pub fn fail_upload(self, call_index: u64) -> Self {
        self.state.lock().faults.fail_uploads.insert(call_index);
        self
    }

    pub fn fail_delete(self, call_index: u64) -> Self {
        self.state.lock().faults.fail_deletes.insert(call_index);
        self
    }

    /// The session that issues this upload call loses its connection; the call and every
    /// later call on that session fail with a connection error.
    pub fn drop_connection_on_upload(self, call_index: u64) -> Self {
        self.state.lock().faults.drop_on_upload = Some(call_index);
        self
    }

    /// Full remote paths of the files currently stored, in sorted order.
    pub fn files(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    pub fn file(&self, remote_name: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(&remote_path(&self.remote_dir, remote_name)).cloned()
    }

    pub fn connect_calls(&self) -> u64 {
        self.state.lock().connect_calls
    }

    pub fn upload_calls(&self) -> u64 {
        self.state.lock().upload_calls
    }

    pub fn delete_calls(&self) -> u64 {
        self.state.lock().delete_calls
    }

    pub fn open_sessions(&self) -> u64 {
        self.state.lock().open_sessions
    }

    pub fn peak_open_sessions(&self) -> u64 {
        self.state.lock().peak_open_sessions
    }
}

impl Connector for MemoryServer {
    type Client = MemoryClient;

    fn connect(&self) -> Result<MemoryClient> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if state.faults.refuse_connections {
            return Err(SftpClientError::ConnectionError("connection refused by memory server".to_owned()));
        }
        state.open_sessions += 1;
        state.peak_open_sessions = state.peak_open_sessions.max(state.open_sessions);
        debug!("Memory session opened ({} open)", state.open_sessions);

        Ok(MemoryClient {
            remote_dir: self.remote_dir.clone(),
            state: self.state.clone(),
            open: true,
            lost: false,
        })
    }

    fn endpoint(&self) -> String {
        format!("memory:{}", self.remote_dir)
    }
}

/// A session on a [MemoryServer].
pub struct MemoryClient {
    remote_dir: String,
    state: Arc<Mutex<ServerState>>,
    open: bool,
    lost: bool,
}

impl MemoryClient {
    fn check_usable(&self) -> Result<()> {
        if !self.open {
            return Err(SftpClientError::ConnectionError("memory session is closed".to_owned()));
        }
        if self.lost {
            return Err(SftpClientError::ConnectionError("memory session was disconnected".to_owned()));
        }
        Ok(())
    }
}

impl Client for MemoryClient {
    fn upload(&mut self, remote_name: &str, data: &[u8], progress_callback: Option<ProgressCallback>) -> Result<()> {
        check_remote_name(remote_name)?;
        self.check_usable()?;
        let path = remote_path(&self.remote_dir, remote_name);

        let latency = {
            let mut state = self.state.lock();
            let call = state.upload_calls;
            state.upload_calls += 1;

            if state.faults.drop_on_upload == Some(call) {
                self.lost = true;
                info!("Memory server dropping connection on upload call {call}");
                return Err(SftpClientError::ConnectionError(format!("writing {path}: socket disconnected")));
            }
            if state.faults.fail_uploads.contains(&call) {
                return Err(SftpClientError::TransferError(format!("writing {path}: permission denied")));
            }
            state.latency
        };

        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let total = data.len() as u64;
        if let Some(cb) = &progress_callback {
            cb(total, total, total);
        }
        self.state.lock().files.insert(path, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, remote_name: &str) -> Result<()> {
        check_remote_name(remote_name)?;
        self.check_usable()?;
        let path = remote_path(&self.remote_dir, remote_name);

        let latency = {
            let mut state = self.state.lock();
            let call = state.delete_calls;
            state.delete_calls += 1;

            if state.faults.fail_deletes.contains(&call) {
                return Err(SftpClientError::TransferError(format!("removing {path}: failure")));
            }
            if state.files.remove(&path).is_none() {
                return Err(SftpClientError::TransferError(format!("removing {path}: no such file")));
            }
            state.latency
        };

        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut state = self.state.lock();
        state.open_sessions -= 1;
        debug!("Memory session closed ({} open)", state.open_sessions);
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.close();
    }
}
