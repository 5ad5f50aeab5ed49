#![cfg_attr(feature = "strict", deny(warnings))]

mod config;
mod env_overrides;
mod error;

pub use config::{StressConfig, DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE, DEFAULT_PORT};
pub use env_overrides::{overridable_fields, ENV_PREFIX};
pub use error::{ConfigError, Result};
