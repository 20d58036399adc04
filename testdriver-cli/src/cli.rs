//! Argument parsing (spec §6 CLI surface): `{command, file, flags}`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "testdriver", about = "AI-driven desktop-UI test automation agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Run without a visible desktop session; falls back to the null input
    /// driver and screen capture.
    #[arg(long, global = true)]
    pub headless: bool,

    /// Print the non-secret config summary to stderr before running.
    #[arg(long, global = true)]
    pub summary: bool,

    /// Attempt to heal a failing step via the reasoning service's `error`
    /// endpoint instead of failing the run immediately.
    #[arg(long, global = true)]
    pub heal: bool,

    /// Persist the run's execution history back to the script file.
    #[arg(long, global = true)]
    pub write: bool,

    /// Attach to an existing sandbox instance rather than booting a new one.
    #[arg(long, global = true)]
    pub sandbox_id: Option<String>,

    /// Boot a fresh sandbox instance for this run.
    #[arg(long, global = true)]
    pub new_sandbox: bool,

    /// Call `std::process::exit` with the run's exit code instead of
    /// returning it to the caller (set by the `testdriver` binary itself).
    #[arg(long, global = true)]
    pub exit: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Feed prompts (one per line on stdin) through the reasoning loop and
    /// optionally persist what ran.
    Edit { file: PathBuf },
    /// Deterministically replay a persisted script.
    Run { file: PathBuf },
    /// Scaffold a new, empty script file.
    Init { file: PathBuf },
    /// Boot (or attach to) a remote sandbox and leave it connected.
    Sandbox,
}
