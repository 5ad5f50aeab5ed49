use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::error::{ConfigError, Result};

/// Environment variables named `SFTP_STRESS_<FIELD>` override the matching key of the
/// configuration file, e.g. `SFTP_STRESS_PASSWORD` or `SFTP_STRESS_FILE_COUNT`.
pub const ENV_PREFIX: &str = "SFTP_STRESS_";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    /// Taken verbatim, so a password like `1234` stays a string.
    Text,
    /// Parsed as a YAML scalar so numbers and booleans get their proper type.
    Scalar,
    /// Like `Text` but never echoed to the log.
    Secret,
}

const FIELDS: &[(&str, FieldKind)] = &[
    ("host", FieldKind::Text),
    ("port", FieldKind::Scalar),
    ("username", FieldKind::Text),
    ("password", FieldKind::Secret),
    ("key_path", FieldKind::Text),
    ("key_passphrase", FieldKind::Secret),
    ("remote_dir", FieldKind::Text),
    ("file_count", FieldKind::Scalar),
    ("min_size", FieldKind::Scalar),
    ("max_size", FieldKind::Scalar),
    ("output_dir", FieldKind::Text),
    ("connect_timeout", FieldKind::Scalar),
    ("transfer_timeout", FieldKind::Scalar),
    ("threads", FieldKind::Scalar),
    ("sleep_interval", FieldKind::Scalar),
    ("keep_alive", FieldKind::Scalar),
    ("retry_attempts", FieldKind::Scalar),
];

/// Configuration keys that can be overridden from the environment.
pub fn overridable_fields() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().map(|(name, _)| *name)
}

fn env_name(field: &str) -> String {
    format!("{ENV_PREFIX}{}", field.to_ascii_uppercase())
}

fn scalar_value(variable: &str, raw: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(raw).map_err(|e| ConfigError::EnvOverride {
        variable: variable.to_owned(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(value),
        _ => Err(ConfigError::EnvOverride {
            variable: variable.to_owned(),
            reason: "expected a single value".to_owned(),
        }),
    }
}

pub(crate) fn apply_env_overrides(mapping: &mut Mapping) -> Result<()> {
    for &(field, kind) in FIELDS {
        let variable = env_name(field);
        let raw = match std::env::var(&variable) {
            Ok(v) => v,
            Err(std::env::VarError::NotPresent) => continue,
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::EnvOverride {
                    variable,
                    reason: "value is not valid unicode".to_owned(),
                });
            },
        };

        let value = match kind {
            FieldKind::Text | FieldKind::Secret => Value::String(raw.clone()),
            FieldKind::Scalar => scalar_value(&variable, &raw)?,
        };

        if kind == FieldKind::Secret {
            info!("Config: {field} = <redacted> (from {variable})");
        } else {
            info!("Config: {field} = {raw:?} (from {variable})");
        }

        mapping.insert(Value::String(field.to_owned()), value);
    }
    Ok(())
}
