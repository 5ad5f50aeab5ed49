//! Stress-tests an SFTP server: uploads and deletes a series of random zip archives,
//! timing each operation, then writes a plain-text report.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use error_printer::ErrorPrinter;
use sftp_client::{validate_private_key, Connector, MemoryServer, SftpConnector};
use sftp_stress::logging::{init_logging, LoggingConfig};
use sftp_stress::{session_config, IndicatifProgress, ProgressObserver, RunReport, RunSettings, Runner};
use stress_config::StressConfig;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YAML configuration file.
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    /// Write the report here instead of the configured output_dir.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run against an in-memory server; nothing goes over the network.
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    no_progress: bool,

    /// Log as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(LoggingConfig {
        use_json: args.log_json,
    });

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = StressConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {:?}", args.config))?;

    let output_dir = args
        .output_dir
        .map(|dir| utils::normalized_path_from_user_string(dir.to_string_lossy()))
        .unwrap_or_else(|| config.output_dir.clone());

    if let Some(key_path) = &config.key_path {
        if !args.dry_run && !validate_private_key(key_path, config.key_passphrase.as_deref()) {
            warn!("Continuing with private key {key_path:?}; authentication may fail");
        }
    }

    let progress: Option<Arc<dyn ProgressObserver>> =
        (!args.no_progress).then(|| Arc::new(IndicatifProgress::new()) as Arc<dyn ProgressObserver>);

    let report = if args.dry_run {
        info!("Dry run: transfers go to an in-memory server");
        run_against(MemoryServer::new(config.remote_dir.clone()), &config, progress)
    } else {
        run_against(SftpConnector::new(session_config(&config)), &config, progress)
    };

    match report
        .write_to_dir(&output_dir)
        .log_error("Cannot write the report; printing it instead")
    {
        Ok(path) => println!("Report written to {}", path.display()),
        Err(_) => print!("{}", report.to_text()),
    }

    let summary = &report.summary;
    info!(
        "Finished: {} of {} file(s) succeeded, {} failed",
        summary.succeeded, summary.count, summary.failed
    );

    match report.result() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            Ok(ExitCode::FAILURE)
        },
    }
}

fn run_against<C: Connector>(
    connector: C,
    config: &StressConfig,
    progress: Option<Arc<dyn ProgressObserver>>,
) -> RunReport {
    let mut runner = Runner::new(RunSettings::from(config), connector);
    if let Some(progress) = progress {
        runner = runner.with_progress(progress);
    }
    RunReport::from(runner.run())
}
