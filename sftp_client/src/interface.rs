use std::sync::Arc;

use crate::error::Result;

/// Upload progress callback, receives (delta, completed, total) in bytes.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, u64) + Send + Sync + 'static>;

/// One authenticated session to a file-transfer endpoint.
///
/// Every call blocks until the remote side has answered. Failures are returned as is;
/// nothing is retried. A [crate::SftpClientError::ConnectionError] means the session is
/// unusable and the caller should stop issuing requests on it.
pub trait Client: Send {
    /// Writes `data` to `remote_name` inside the session's remote directory, replacing
    /// any existing file of that name.
    fn upload(&mut self, remote_name: &str, data: &[u8], progress_callback: Option<ProgressCallback>) -> Result<()>;

    /// Removes `remote_name` from the session's remote directory. A missing file is an error.
    fn delete(&mut self, remote_name: &str) -> Result<()>;

    /// Releases the session. Safe to call more than once; failures are only logged.
    fn close(&mut self);
}

/// Opens new sessions. Shared between worker threads, each of which owns the sessions it opens.
pub trait Connector: Send + Sync {
    type Client: Client;

    fn connect(&self) -> Result<Self::Client>;

    /// Human readable name of the endpoint, for logs.
    fn endpoint(&self) -> String;
}

/// Joins a remote directory and a file name with `/`, the separator SFTP servers expect
/// regardless of the local platform.
pub fn remote_path(remote_dir: &str, name: &str) -> String {
    let dir = remote_dir.trim_end_matches('/');
    format!("{dir}/{name}")
}

pub(crate) fn check_remote_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(crate::SftpClientError::InvalidArguments(format!("invalid remote file name {name:?}")));
    }
    Ok(())
}
