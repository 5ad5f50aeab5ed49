use std::fmt::{Debug, Display};
use std::panic::Location;

use tracing::{error, warn};

/// Logs the error held by a `Result` at error or warn level and passes the `Result` through
/// unchanged, so callers can record a failure in place and still propagate it with `?`.
///
/// The log line carries the caller's source location rather than this crate's.
pub trait ErrorPrinter {
    #[track_caller]
    fn log_error<M: Display>(self, message: M) -> Self;

    #[track_caller]
    fn warn_error<M: Display>(self, message: M) -> Self;
}

impl<T, E: Debug> ErrorPrinter for Result<T, E> {
    #[track_caller]
    fn log_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            error!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }

    #[track_caller]
    fn warn_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = Location::caller();
            warn!(caller = %caller, "{message}, error: {e:?}");
        }
        self
    }
}
