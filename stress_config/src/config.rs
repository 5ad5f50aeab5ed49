use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::{info, warn};
use utils::ByteSize;

use crate::env_overrides::apply_env_overrides;
use crate::error::{ConfigError, Result};

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_MIN_SIZE: ByteSize = ByteSize::new(6000);
pub const DEFAULT_MAX_SIZE: ByteSize = ByteSize::new(64_000_000);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings for one stress run, loaded once at startup and never modified afterwards.
///
/// The YAML document must only contain the keys below; anything else is rejected.
///
/// ```yaml
/// host: sftp.example.com
/// port: 22
/// username: loadtest
/// key_path: ~/.ssh/id_ed25519
/// remote_dir: /upload
/// file_count: 100
/// min_size: 64kb
/// max_size: 16mb
/// output_dir: ./reports
/// ```
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StressConfig {
    /// Hostname or IP address of the SFTP server.
    pub host: String,

    /// The default value is 22.
    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// Password authentication. Tried after the key when both are given.
    #[serde(default)]
    pub password: Option<String>,

    /// Private key file for public key authentication; `~` is expanded.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Passphrase for an encrypted private key.
    #[serde(default)]
    pub key_passphrase: Option<String>,

    /// Directory on the server that test files are written to.
    ///
    /// The default value is "/".
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Number of files to generate, upload and delete.
    ///
    /// The default value is 1.
    #[serde(default = "default_file_count")]
    pub file_count: u64,

    /// Smallest payload size, inclusive.
    ///
    /// The default value is 6000 bytes.
    #[serde(default = "default_min_size")]
    pub min_size: ByteSize,

    /// Largest payload size, inclusive.
    ///
    /// The default value is 64mb.
    #[serde(default = "default_max_size")]
    pub max_size: ByteSize,

    /// Directory the report is written to.
    ///
    /// The default value is the current directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Time allowed to establish the TCP connection, in seconds. Zero or any negative
    /// value (e.g. -1) disables the timeout.
    ///
    /// The default value is 20 seconds.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_seconds")]
    pub connect_timeout: Option<Duration>,

    /// Time allowed for any single blocking session call, in seconds. Zero or any
    /// negative value (e.g. -1) disables the timeout.
    ///
    /// The default value is 20 seconds.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_seconds")]
    pub transfer_timeout: Option<Duration>,

    /// Number of worker threads, each with its own session. Must be at least 1.
    ///
    /// The default value is 1, which runs every transfer sequentially.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Pause after each file, in seconds. Zero or a negative value means no pause.
    ///
    /// The default value is 0.
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub sleep_interval: Option<Duration>,

    /// Reuse one session for the whole run. When false every file gets a fresh session
    /// and its connect time is recorded.
    ///
    /// The default value is true.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,

    /// Accepted for compatibility with older configuration files. Transfers are never
    /// retried.
    #[serde(default)]
    pub retry_attempts: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_remote_dir() -> String {
    "/".to_owned()
}

fn default_file_count() -> u64 {
    1
}

fn default_min_size() -> ByteSize {
    DEFAULT_MIN_SIZE
}

fn default_max_size() -> ByteSize {
    DEFAULT_MAX_SIZE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout() -> Option<Duration> {
    Some(DEFAULT_TIMEOUT)
}

fn default_threads() -> usize {
    1
}

fn default_keep_alive() -> bool {
    true
}

/// Seconds as an integer or float; zero, negative values and null mean "none".
fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error> {
    let secs: Option<f64> = Option::deserialize(deserializer)?;
    match secs {
        Some(s) if s > 0.0 => Duration::try_from_secs_f64(s).map(Some).map_err(serde::de::Error::custom),
        Some(s) if s.is_nan() => Err(serde::de::Error::custom("duration in seconds cannot be NaN")),
        _ => Ok(None),
    }
}

impl StressConfig {
    /// Reads, parses and validates the configuration at `path`.
    ///
    /// `SFTP_STRESS_<FIELD>` environment variables take precedence over values in the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loading configuration from {path:?}");
        Self::from_yaml_str(&text)
    }

    /// Parses and validates a configuration document held in memory, applying
    /// environment overrides.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: serde_yaml::Value = if text.trim().is_empty() {
            serde_yaml::Value::Mapping(Default::default())
        } else {
            serde_yaml::from_str(text)?
        };

        let serde_yaml::Value::Mapping(mut mapping) = document else {
            return Err(ConfigError::NotAMapping);
        };

        apply_env_overrides(&mut mapping)?;

        let mut config: StressConfig = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
        config.expand_paths();
        config.validate()?;
        config.log_values();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        if let Some(key_path) = &self.key_path {
            self.key_path = Some(utils::normalized_path_from_user_string(key_path.to_string_lossy()));
        }
        self.output_dir = utils::normalized_path_from_user_string(self.output_dir.to_string_lossy());
    }

    /// Checks ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_owned()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be between 1 and 65535".to_owned()));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("username must not be empty".to_owned()));
        }
        if self.password.is_none() && self.key_path.is_none() {
            return Err(ConfigError::Invalid("one of password or key_path is required".to_owned()));
        }
        if self.key_passphrase.is_some() && self.key_path.is_none() {
            return Err(ConfigError::Invalid("key_passphrase is set but key_path is missing".to_owned()));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size ({}) is larger than max_size ({})",
                self.min_size.as_u64(),
                self.max_size.as_u64()
            )));
        }
        if self.max_size.as_u64() == 0 {
            return Err(ConfigError::Invalid("max_size must be greater than zero".to_owned()));
        }
        if usize::try_from(self.max_size.as_u64()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_size ({}) does not fit in memory on this platform",
                self.max_size.as_u64()
            )));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_owned()));
        }
        if self.remote_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("remote_dir must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Inclusive range payload sizes are drawn from.
    pub fn size_range(&self) -> RangeInclusive<u64> {
        self.min_size.as_u64()..=self.max_size.as_u64()
    }

    fn log_values(&self) {
        info!("Config: {self:?}");
        if self.retry_attempts > 0 {
            warn!(
                "Config: retry_attempts = {} is ignored; failed transfers are recorded and not retried.",
                self.retry_attempts
            );
        }
    }
}

fn redacted(v: &Option<String>) -> &'static str {
    if v.is_some() { "<redacted>" } else { "<unset>" }
}

impl fmt::Debug for StressConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StressConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("key_path", &self.key_path)
            .field("key_passphrase", &redacted(&self.key_passphrase))
            .field("remote_dir", &self.remote_dir)
            .field("file_count", &self.file_count)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("output_dir", &self.output_dir)
            .field("connect_timeout", &self.connect_timeout)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("threads", &self.threads)
            .field("sleep_interval", &self.sleep_interval)
            .field("keep_alive", &self.keep_alive)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tracing_test::traced_test;

    use super::*;
    use crate::env_overrides::ENV_PREFIX;

    const MINIMAL: &str = "host: sftp.local\nusername: tester\npassword: secret\n";

    #[test]
    #[serial(config_env)]
    fn test_defaults() {
        let config = StressConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.remote_dir, "/");
        assert_eq!(config.file_count, 1);
        assert_eq!(config.min_size, DEFAULT_MIN_SIZE);
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.transfer_timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.threads, 1);
        assert_eq!(config.sleep_interval, None);
        assert!(config.keep_alive);
        assert!(config.output_dir.is_absolute());
    }

    #[test]
    #[serial(config_env)]
    fn test_negative_timeout_disables_it() {
        let text = format!("{MINIMAL}connect_timeout: -1\ntransfer_timeout: 2.5\nsleep_interval: 0\n");
        let config = StressConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.transfer_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.sleep_interval, None);

        let text = format!("{MINIMAL}connect_timeout: 0\ntransfer_timeout: -5\nsleep_interval: -0.5\n");
        let config = StressConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.transfer_timeout, None);
        assert_eq!(config.sleep_interval, None);
    }

    #[test]
    #[serial(config_env)]
    fn test_sizes_accept_units() {
        let text = format!("{MINIMAL}min_size: 1kb\nmax_size: \"2 MiB\"\n");
        let config = StressConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.size_range(), 1000..=2 * 1024 * 1024);
    }

    #[test]
    #[serial(config_env)]
    fn test_validation_failures() {
        let cases = [
            format!("{MINIMAL}min_size: 2048\nmax_size: 1024\n"),
            format!("{MINIMAL}max_size: 0\nmin_size: 0\n"),
            format!("{MINIMAL}threads: 0\n"),
            format!("{MINIMAL}port: 0\n"),
            "host: sftp.local\nusername: tester\n".to_owned(),
            "host: ''\nusername: tester\npassword: x\n".to_owned(),
            "host: h\nusername: tester\npassword: x\nkey_passphrase: y\n".to_owned(),
        ];
        for text in cases {
            let err = StressConfig::from_yaml_str(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{text:?} gave {err:?}");
        }
    }

    #[test]
    #[serial(config_env)]
    fn test_parse_failures() {
        let cases = [
            format!("{MINIMAL}file_count: -3\n"),
            format!("{MINIMAL}port: seventy\n"),
            format!("{MINIMAL}max_files: 3\n"),
            format!("{MINIMAL}connect_timeout: 1e30\n"),
            format!("{MINIMAL}transfer_timeout: .inf\n"),
            "username: tester\npassword: x\n".to_owned(),
        ];
        for text in cases {
            let err = StressConfig::from_yaml_str(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{text:?} gave {err:?}");
        }

        assert!(matches!(StressConfig::from_yaml_str("- a\n- b\n"), Err(ConfigError::NotAMapping)));
    }

    #[test]
    #[serial(config_env)]
    fn test_debug_redacts_secrets() {
        let text = "host: h\nusername: u\npassword: hunter2\nkey_path: /k\nkey_passphrase: swordfish\n";
        let config = StressConfig::from_yaml_str(text).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("swordfish"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    #[traced_test]
    #[serial(config_env)]
    fn test_retry_attempts_warns() {
        let text = format!("{MINIMAL}retry_attempts: 3\n");
        let config = StressConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.retry_attempts, 3);
        assert!(logs_contain("retry_attempts = 3 is ignored"));
        assert!(ENV_PREFIX.starts_with("SFTP_STRESS"));
    }
}
