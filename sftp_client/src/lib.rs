#![cfg_attr(feature = "strict", deny(warnings))]

pub use crate::error::{Result, SftpClientError};
pub use interface::{remote_path, Client, Connector, ProgressCallback};
pub use key_check::{inspect_private_key, validate_private_key, KeyFormat, KeyStatus};
pub use memory_client::{MemoryClient, MemoryServer};
pub use session_config::SessionConfig;
pub use sftp_client::{SftpClient, SftpConnector};

mod error;
mod interface;
mod key_check;
mod memory_client;
mod session_config;
mod sftp_client;
