use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default console log level. Override using the `RUST_LOG` env variable.
const DEFAULT_LOG_LEVEL_CONSOLE: &str = "info";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub use_json: bool,
}

/// Sets up console logging to stderr. Should only be called once.
pub fn init_logging(cfg: LoggingConfig) {
    let registry = tracing_subscriber::registry();

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_CONSOLE))
        .unwrap_or_default();

    if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).init();
    }
}
