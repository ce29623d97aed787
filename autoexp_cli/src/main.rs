mod cli;
mod error_fmt;
mod run;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("Error: {}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(cli)?;
    cfg.validate().wrap_err("invalid configuration")?;
    init_tracing(&cli.log_level, cli.json, &cfg.logging)?;

    // Ctrl-C requests cancellation; the session honors it at the next cycle
    // boundary, never mid-step.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::Relaxed);
    })
    .wrap_err("install ctrl-c handler")?;

    match &cli.cmd {
        Commands::Converge {
            max_iterations,
            settle_ms,
            trace,
            scene_luma,
            print_runtime,
        } => {
            let opts = run::ConvergeOpts {
                max_iterations: *max_iterations,
                settle_ms: *settle_ms,
                trace: trace.clone(),
                scene_luma: *scene_luma,
                print_runtime: *print_runtime,
            };
            run::run_converge(&cfg, &opts, cli.json, shutdown)
        }
        Commands::SelfCheck => run::self_check(cli.json),
    }
}

fn load_config(cli: &Cli) -> eyre::Result<autoexp_config::Config> {
    if !cli.config.exists() {
        // The stock path is optional: defaults drive the simulated sensor.
        if cli.config == std::path::Path::new("etc/autoexp.toml") {
            tracing::debug!("no config at default path, using built-in defaults");
            return Ok(autoexp_config::Config::default());
        }
        eyre::bail!("config file {:?} not found", cli.config);
    }
    let content = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("failed to read config {:?}", cli.config))?;
    autoexp_config::load_toml(&content)
        .map_err(|e| eyre::eyre!("parse config {:?}: {e}", cli.config))
}

fn init_tracing(level: &str, json: bool, logging: &autoexp_config::Logging) -> eyre::Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG wins over the flag for per-target filtering.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(file) = &logging.file {
        let path = std::path::Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "autoexp.log".into());
        let rotation = match logging.rotation.as_deref() {
            Some("daily") => Rotation::DAILY,
            Some("hourly") => Rotation::HOURLY,
            _ => Rotation::NEVER,
        };
        let appender = RollingFileAppender::new(rotation, dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        registry
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}
