use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use error_printer::ErrorPrinter;
use ssh2::{Session, Sftp};
use tracing::{debug, info, warn};

use crate::error::{Result, SftpClientError};
use crate::interface::{check_remote_name, remote_path, Client, Connector, ProgressCallback};
use crate::session_config::SessionConfig;

/// Uploads are written, and progress is reported, in blocks of this size.
const UPLOAD_BLOCK_SIZE: usize = 256 * 1024;

fn timeout_ms(timeout: Option<Duration>) -> u32 {
    // libssh2 treats 0 as "no timeout".
    timeout.map(|t| t.as_millis().clamp(1, u32::MAX as u128) as u32).unwrap_or(0)
}

struct ActiveSession {
    // Declared before `session` so the SFTP channel is released first.
    sftp: Sftp,
    session: Session,
}

/// A [Client] backed by one libssh2 session and its SFTP subsystem.
pub struct SftpClient {
    remote_dir: String,
    endpoint: String,
    active: Option<ActiveSession>,
}

impl SftpClient {
    /// Connects over TCP, performs the SSH handshake, authenticates and opens the SFTP
    /// subsystem. Every failure along the way is a [SftpClientError::ConnectionError].
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        debug!("Connecting to {endpoint}");

        let tcp = connect_tcp(&config.host, config.port, config.connect_timeout)?;

        let mut session =
            Session::new().map_err(|e| SftpClientError::ConnectionError(format!("creating SSH session: {e}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout_ms(config.connect_timeout));
        session
            .handshake()
            .map_err(|e| SftpClientError::ConnectionError(format!("SSH handshake with {endpoint}: {e}")))?;

        authenticate(&session, config)?;

        session.set_timeout(timeout_ms(config.transfer_timeout));
        let sftp = session
            .sftp()
            .map_err(|e| SftpClientError::ConnectionError(format!("opening SFTP subsystem on {endpoint}: {e}")))?;

        info!("Connected to {endpoint}");
        Ok(Self {
            remote_dir: config.remote_dir.clone(),
            endpoint,
            active: Some(ActiveSession { sftp, session }),
        })
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.active
            .as_ref()
            .map(|a| &a.sftp)
            .ok_or_else(|| SftpClientError::ConnectionError(format!("session to {} is closed", self.endpoint)))
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| SftpClientError::ConnectionError(format!("resolving {host}:{port}: {e}")))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("TCP connect to {addr} failed: {e}");
                last_error = Some(e);
            },
        }
    }

    Err(SftpClientError::ConnectionError(match last_error {
        Some(e) => format!("connecting to {host}:{port}: {e}"),
        None => format!("{host}:{port} did not resolve to any address"),
    }))
}

/// Tries the private key first, then the password.
fn authenticate(session: &Session, config: &SessionConfig) -> Result<()> {
    let mut failures = Vec::new();

    if let Some(key_path) = &config.key_path {
        match session.userauth_pubkey_file(&config.username, None, key_path, config.key_passphrase.as_deref()) {
            Ok(()) => {},
            Err(e) => failures.push(format!("public key {key_path:?}: {e}")),
        }
    }

    if !session.authenticated() {
        if let Some(password) = &config.password {
            match session.userauth_password(&config.username, password) {
                Ok(()) => {},
                Err(e) => failures.push(format!("password: {e}")),
            }
        }
    }

    if session.authenticated() {
        Ok(())
    } else {
        if failures.is_empty() {
            failures.push("no credentials configured".to_owned());
        }
        Err(SftpClientError::ConnectionError(format!(
            "authentication as {} failed ({})",
            config.username,
            failures.join("; ")
        )))
    }
}

impl Client for SftpClient {
    fn upload(&mut self, remote_name: &str, data: &[u8], progress_callback: Option<ProgressCallback>) -> Result<()> {
        check_remote_name(remote_name)?;
        let path = remote_path(&self.remote_dir, remote_name);
        let sftp = self.sftp()?;

        let mut file = sftp
            .create(Path::new(&path))
            .map_err(|e| SftpClientError::from_ssh2(&format!("creating {path}"), e))?;

        let total = data.len() as u64;
        let mut completed = 0u64;
        for block in data.chunks(UPLOAD_BLOCK_SIZE) {
            file.write_all(block)
                .map_err(|e| SftpClientError::from_io(&format!("writing {path}"), e))?;
            completed += block.len() as u64;
            if let Some(cb) = &progress_callback {
                cb(block.len() as u64, completed, total);
            }
        }

        file.close()
            .map_err(|e| SftpClientError::from_ssh2(&format!("closing {path}"), e))?;
        debug!("Uploaded {total} bytes to {path}");
        Ok(())
    }

    fn delete(&mut self, remote_name: &str) -> Result<()> {
        check_remote_name(remote_name)?;
        let path = remote_path(&self.remote_dir, remote_name);
        self.sftp()?
            .unlink(Path::new(&path))
            .map_err(|e| SftpClientError::from_ssh2(&format!("removing {path}"), e))?;
        debug!("Removed {path}");
        Ok(())
    }

    fn close(&mut self) {
        let Some(ActiveSession { sftp, session }) = self.active.take() else {
            return;
        };
        drop(sftp);
        let _ = session
            .disconnect(None, "sftp stress run finished", None)
            .warn_error(format!("error disconnecting from {}", self.endpoint));
        debug!("Closed session to {}", self.endpoint);
    }
}

impl Drop for SftpClient {
    fn drop(&mut self) {
        if self.active.is_some() {
            warn!("Session to {} dropped without close(); closing now", self.endpoint);
            self.close();
        }
    }
}

/// Opens [SftpClient] sessions from a fixed [SessionConfig].
#[derive(Clone, Debug)]
pub struct SftpConnector {
    config: SessionConfig,
}

impl SftpConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl Connector for SftpConnector {
    type Client = SftpClient;

    fn connect(&self) -> Result<SftpClient> {
        SftpClient::connect(&self.config)
    }

    fn endpoint(&self) -> String {
        self.config.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn test_timeout_ms() {
        assert_eq!(timeout_ms(None), 0);
        assert_eq!(timeout_ms(Some(Duration::from_secs(20))), 20_000);
        assert_eq!(timeout_ms(Some(Duration::from_micros(10))), 1);
    }

    #[test]
    fn test_connection_refused_is_a_connection_error() {
        // Bind then drop to get a local port with nothing listening on it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = SessionConfig {
            host: "127.0.0.1".to_owned(),
            port,
            username: "nobody".to_owned(),
            password: Some("pw".to_owned()),
            remote_dir: "/".to_owned(),
            connect_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };

        let err = SftpConnector::new(config).connect().err().unwrap();
        assert!(err.is_connection_error(), "{err}");
    }

    #[test]
    fn test_handshake_failure_is_a_connection_error() {
        // A server that accepts and immediately hangs up never completes the SSH banner exchange.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let config = SessionConfig {
            host: "127.0.0.1".to_owned(),
            port,
            username: "nobody".to_owned(),
            password: Some("pw".to_owned()),
            remote_dir: "/".to_owned(),
            connect_timeout: Some(Duration::from_secs(2)),
            transfer_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let err = SftpClient::connect(&config).err().unwrap();
        assert!(err.is_connection_error(), "{err}");
        server.join().unwrap();
    }
}
