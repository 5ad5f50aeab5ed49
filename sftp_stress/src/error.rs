use std::path::PathBuf;

use sftp_client::SftpClientError;
use stress_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Cannot write report to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StressError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] SftpClientError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Cannot build zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid file size range {min}..={max}")]
    EmptySizeRange { min: u64, max: u64 },

    #[error("Run aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, StressError>;
