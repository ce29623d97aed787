//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "autoexp", version, about = "Auto-exposure / white-balance CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/autoexp.toml")]
    pub config: PathBuf,

    /// Emit JSON lines instead of pretty output
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge exposure and white balance, then report capture registers
    Converge {
        /// Override driver: maximum convergence cycles
        #[arg(long, value_name = "N")]
        max_iterations: Option<u32>,
        /// Override driver: settle delay between cycles in ms
        #[arg(long, value_name = "MS")]
        settle_ms: Option<u64>,
        /// Replay a recorded metering trace CSV instead of the simulated
        /// sensor (strict headers: spot_r,...,matrix_b)
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Uniform scene luminance for the simulated sensor (roughly 0.0 to 1.0)
        #[arg(long, value_name = "LUMA")]
        scene_luma: Option<f64>,
        /// Print total runtime on completion
        #[arg(long, action = ArgAction::SetTrue)]
        print_runtime: bool,
    },
    /// Quick health check (simulated sensor round-trip)
    SelfCheck,
}
