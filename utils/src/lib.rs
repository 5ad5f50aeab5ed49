#![cfg_attr(feature = "strict", deny(warnings))]

pub mod byte_size;
pub use byte_size::{ByteSize, ByteSizeParseError};

mod file_paths;
pub use file_paths::normalized_path_from_user_string;

mod guards;
pub use guards::EnvVarGuard;
