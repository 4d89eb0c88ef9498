mod cli;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sanpoll_core::{ArrayConfig, ArrayReport, CoreError, Vendor};

use crate::cli::{Cli, Command, GlobalOpts, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(ref args) => run(&cli.global, args).await,
        Command::Arrays => list_arrays(&cli.global),
    }
}

// ── Commands ─────────────────────────────────────────────────────────

async fn run(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let _log_guard = init_tracing(global, args.log_dir.as_deref(), &args.array);

    let config = match load_config(global) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("sanpoll: {e}");
            return ExitCode::from(2);
        }
    };
    let array = match sanpoll_config::array_config(&config, &args.array) {
        Ok(array) => array,
        Err(e) => {
            error!("{e}");
            eprintln!("sanpoll: {e}");
            return ExitCode::from(2);
        }
    };

    info!(array = %args.array, vendor = %array.vendor, "starting collection pass");
    let report = match collect(&array).await {
        Ok(report) => report,
        Err(e) => {
            // Login and channel failures abort the pass; everything else
            // was already logged and skipped inside the driver.
            error!(array = %args.array, "collection pass failed: {e}");
            eprintln!("sanpoll: collection pass failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        components = report.components.len(),
        samples = report.performance.len(),
        "collection pass complete"
    );

    let json = match serde_json::to_string_pretty(&report) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize report: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(ref path) = args.output {
        if let Err(e) = std::fs::write(path, &json) {
            error!(path = %path.display(), "failed to write report: {e}");
            eprintln!("sanpoll: failed to write report: {e}");
            return ExitCode::FAILURE;
        }
        info!(path = %path.display(), "report written");
    } else {
        println!("{json}");
    }
    ExitCode::SUCCESS
}

fn list_arrays(global: &GlobalOpts) -> ExitCode {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sanpoll: {e}");
            return ExitCode::from(2);
        }
    };

    let mut names: Vec<_> = config.arrays.iter().collect();
    names.sort_by_key(|(name, _)| name.to_owned());
    for (name, profile) in names {
        println!("{name}\t{}\t{}", profile.vendor, profile.url);
    }
    ExitCode::SUCCESS
}

// ── Plumbing ─────────────────────────────────────────────────────────

fn load_config(global: &GlobalOpts) -> Result<sanpoll_config::Config, sanpoll_config::ConfigError> {
    match global.config {
        Some(ref path) => sanpoll_config::load_config_from(path),
        None => sanpoll_config::load_config(),
    }
}

async fn collect(config: &ArrayConfig) -> Result<ArrayReport, CoreError> {
    match config.vendor {
        Vendor::Huawei => {
            let mut driver = sanpoll_core::HuaweiDriver::new(config)?;
            driver.collect().await
        }
        Vendor::Dell => {
            let mut driver = sanpoll_core::DellDriver::new(config)?;
            driver.collect().await
        }
        Vendor::IbmV7000 => {
            let mut driver = sanpoll_core::IbmDriver::new(config)?;
            driver.collect().await
        }
    }
}

/// Stderr logging always; a per-array file when `--log-dir` is given.
/// The returned guard must stay alive until exit or the tail of the
/// file log is lost.
fn init_tracing(
    global: &GlobalOpts,
    log_dir: Option<&Path>,
    array: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = if global.quiet {
        "error"
    } else {
        match global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sanpoll={level},sanpoll_core={level},sanpoll_api={level}"
        ))
    });

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::never(dir, format!("{array}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    }
}
