#![cfg_attr(feature = "strict", deny(warnings))]

pub mod error;
pub mod generator;
pub mod logging;
pub mod progress;
pub mod report;
pub mod runner;
pub mod settings;

pub use error::{ReportError, Result, StressError};
pub use generator::{FileGenerator, GeneratedFile};
pub use progress::{IndicatifProgress, ProgressEvent, ProgressObserver};
pub use report::{OperationStats, ReportSummary, RunReport};
pub use runner::{file_name, Outcome, RunOutcome, RunState, Runner, Stage, TransferRecord};
pub use settings::{session_config, RunSettings};
