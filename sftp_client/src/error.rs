use thiserror::Error;

/// libssh2 session error codes that mean the transport itself is gone, as opposed to a
/// single SFTP request failing.
const SOCKET_NONE: i32 = -1;
const BANNER_RECV: i32 = -2;
const BANNER_SEND: i32 = -3;
const SOCKET_SEND: i32 = -7;
const SOCKET_DISCONNECT: i32 = -13;
const CHANNEL_CLOSED: i32 = -26;
const SOCKET_RECV: i32 = -43;

const SESSION_LOST_CODES: &[i32] = &[
    SOCKET_NONE,
    BANNER_RECV,
    BANNER_SEND,
    SOCKET_SEND,
    SOCKET_DISCONNECT,
    CHANNEL_CLOSED,
    SOCKET_RECV,
];

fn session_lost(err: &ssh2::Error) -> bool {
    match err.code() {
        ssh2::ErrorCode::Session(code) => SESSION_LOST_CODES.contains(&code),
        ssh2::ErrorCode::SFTP(_) => false,
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SftpClientError {
    /// The session could not be established or has been lost. Fatal for the run.
    #[error("Connection Error: {0}")]
    ConnectionError(String),

    /// A single upload or delete failed while the session is still usable.
    #[error("Transfer Error: {0}")]
    TransferError(String),

    #[error("Invalid Arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, SftpClientError>;

impl SftpClientError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SftpClientError::ConnectionError(_))
    }

    /// Classifies a libssh2 error raised while `context` was being attempted.
    pub(crate) fn from_ssh2(context: &str, err: ssh2::Error) -> Self {
        if session_lost(&err) {
            SftpClientError::ConnectionError(format!("{context}: {err}"))
        } else {
            SftpClientError::TransferError(format!("{context}: {err}"))
        }
    }

    /// Classifies an I/O error from a remote file handle. ssh2 wraps its own errors in
    /// `std::io::Error`, so those are unwrapped and classified by their libssh2 code.
    pub(crate) fn from_io(context: &str, err: std::io::Error) -> Self {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<ssh2::Error>()) {
            return if session_lost(inner) {
                SftpClientError::ConnectionError(format!("{context}: {inner}"))
            } else {
                SftpClientError::TransferError(format!("{context}: {inner}"))
            };
        }

        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => SftpClientError::ConnectionError(format!("{context}: {err}")),
            _ => SftpClientError::TransferError(format!("{context}: {err}")),
        }
    }
}
