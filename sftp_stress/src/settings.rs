use std::ops::RangeInclusive;
use std::time::Duration;

use sftp_client::SessionConfig;
use stress_config::StressConfig;

/// The part of [StressConfig] that drives the transfer loop.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub file_count: u64,
    pub size_range: RangeInclusive<u64>,
    pub threads: usize,
    pub keep_alive: bool,
    pub sleep_interval: Option<Duration>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            file_count: 1,
            size_range: stress_config::DEFAULT_MIN_SIZE.as_u64()..=stress_config::DEFAULT_MAX_SIZE.as_u64(),
            threads: 1,
            keep_alive: true,
            sleep_interval: None,
        }
    }
}

impl From<&StressConfig> for RunSettings {
    fn from(config: &StressConfig) -> Self {
        Self {
            file_count: config.file_count,
            size_range: config.size_range(),
            threads: config.threads,
            keep_alive: config.keep_alive,
            sleep_interval: config.sleep_interval,
        }
    }
}

/// Connection parameters for the SFTP sessions a run opens.
pub fn session_config(config: &StressConfig) -> SessionConfig {
    SessionConfig {
        host: config.host.clone(),
        port: config.port,
        username: config.username.clone(),
        password: config.password.clone(),
        key_path: config.key_path.clone(),
        key_passphrase: config.key_passphrase.clone(),
        remote_dir: config.remote_dir.clone(),
        connect_timeout: config.connect_timeout,
        transfer_timeout: config.transfer_timeout,
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial(config_env)]
    fn test_settings_from_config() {
        let config = StressConfig::from_yaml_str(
            "host: sftp.local\nport: 2222\nusername: u\npassword: p\nremote_dir: /in\nfile_count: 9\n\
             min_size: 10\nmax_size: 20\nthreads: 3\nkeep_alive: false\nsleep_interval: 0.5\nconnect_timeout: -1\n",
        )
        .unwrap();

        let settings = RunSettings::from(&config);
        assert_eq!(settings.file_count, 9);
        assert_eq!(settings.size_range, 10..=20);
        assert_eq!(settings.threads, 3);
        assert!(!settings.keep_alive);
        assert_eq!(settings.sleep_interval, Some(Duration::from_millis(500)));

        let session = session_config(&config);
        assert_eq!(session.endpoint(), "u@sftp.local:2222");
        assert_eq!(session.remote_dir, "/in");
        assert_eq!(session.connect_timeout, None);
        assert_eq!(session.transfer_timeout, Some(Duration::from_secs(20)));
    }
}
