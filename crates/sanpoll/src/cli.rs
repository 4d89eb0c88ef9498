//! Clap derive structures for the `sanpoll` CLI.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sanpoll -- poll storage-array consoles into one canonical report
#[derive(Debug, Parser)]
#[command(
    name = "sanpoll",
    version,
    about = "Poll a storage-array management console and emit a normalized report",
    long_about = "Polls proprietary storage-array management consoles (OceanStor,\n\
        Storage Center, Storwize V7000) and normalizes their health, capacity,\n\
        and performance data into one JSON schema.\n\n\
        One invocation performs one full collection pass against one array,\n\
        then exits.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the configuration file
    #[arg(long, short = 'c', env = "SANPOLL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one collection pass against a configured array
    Run(RunArgs),

    /// List the arrays in the configuration file
    Arrays,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Array name from the configuration file
    pub array: String,

    /// Write the report JSON here instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Also write a per-array log file into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}
