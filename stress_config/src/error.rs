use std::path::PathBuf;

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration document must be a mapping of keys to values")]
    NotAMapping,

    #[error("Invalid value for environment variable {variable}: {reason}")]
    EnvOverride { variable: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
