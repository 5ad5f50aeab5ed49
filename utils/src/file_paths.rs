use std::path::{Path, PathBuf};

/// Turns a path written by a user (config file, command line) into an absolute path.
///
/// A leading `~` is expanded to the home directory and relative paths are resolved
/// against the current working directory. If the path cannot be made absolute the
/// expanded form is returned as is.
pub fn normalized_path_from_user_string(path: impl AsRef<str>) -> PathBuf {
    let expanded = shellexpand::path::tilde(Path::new(path.as_ref()));
    let expanded_path = expanded.as_ref();

    std::path::absolute(expanded_path).unwrap_or_else(|_| expanded_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::EnvVarGuard;

    #[test]
    fn test_relative_path_becomes_absolute() {
        let p = normalized_path_from_user_string("reports/out");
        assert!(p.is_absolute());
        assert!(p.ends_with("reports/out"));
    }

    #[cfg(unix)]
    #[test]
    #[serial(env_home)]
    fn test_tilde_expansion() {
        let home = tempfile::tempdir().unwrap();
        let _guard = EnvVarGuard::set("HOME", home.path());

        let p = normalized_path_from_user_string("~/reports");
        assert_eq!(p, home.path().join("reports"));
    }

    #[test]
    fn test_absolute_path_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let p = normalized_path_from_user_string(dir.path().to_string_lossy());
        assert_eq!(p, dir.path());
    }
}
