use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to open one SFTP session.
#[derive(Clone, Default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub remote_dir: String,
    /// Applies to the TCP connect and, through the session timeout, to the SSH handshake
    /// and authentication. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Applies to every blocking call once the session is up. `None` waits forever.
    pub transfer_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "<redacted>"))
            .field("remote_dir", &self.remote_dir)
            .field("connect_timeout", &self.connect_timeout)
            .field("transfer_timeout", &self.transfer_timeout)
            .finish()
    }
}
