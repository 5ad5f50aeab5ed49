use std::env;
use std::ffi::OsStr;

/// Sets an environment variable for the lifetime of the guard and restores the previous
/// value (or removes the variable) on drop.
///
/// Intended for tests; combine with `serial_test` since the process environment is shared
/// between threads.
///
/// ```no_run
/// use utils::EnvVarGuard;
///
/// let _guard = EnvVarGuard::set("SFTP_STRESS_HOST", "sftp.example.com");
/// // SFTP_STRESS_HOST is set until _guard goes out of scope.
/// ```
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = env::var(key).ok();
        env::set_var(key, value);
        Self { key, prev }
    }

    /// Removes the variable until the guard is dropped.
    pub fn unset(key: &'static str) -> Self {
        let prev = env::var(key).ok();
        env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.prev {
            env::set_var(self.key, v);
        } else {
            env::remove_var(self.key);
        }
    }
}
