//! Argument parsing, `.env` loading, and stdin prompt collection for the
//! `testdriver` binary. The actual control flow lives in the `testdriver`
//! crate; this crate is the thin external-collaborator layer spec §1 keeps
//! out of the core (CLI parsing, env loading, terminal I/O).

pub mod cli;

use std::io::BufRead;

use testdriver::{RunCommand, RunRequest};

use crate::cli::{Cli, CliCommand};

/// Loads `.env` (best-effort) and initializes a `tracing` subscriber reading
/// `RUST_LOG`, matching how `testdriver` itself logs.
pub fn init_process() {
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Converts parsed CLI arguments into the core's [`RunRequest`]. `Edit` reads
/// one prompt per non-empty line from stdin until EOF.
pub fn to_run_request(cli: Cli) -> RunRequest {
    let (command, file, prompts) = match cli.command {
        CliCommand::Edit { file } => (RunCommand::Edit, Some(file), read_prompts_from_stdin()),
        CliCommand::Run { file } => (RunCommand::Run, Some(file), Vec::new()),
        CliCommand::Init { file } => (RunCommand::Init, Some(file), Vec::new()),
        CliCommand::Sandbox => (RunCommand::Sandbox, None, Vec::new()),
    };

    RunRequest {
        command: Some(command),
        file,
        heal: cli.heal,
        write: cli.write,
        exit: cli.exit,
        headless: cli.headless,
        sandbox_id: cli.sandbox_id,
        new_sandbox: cli.new_sandbox,
        summary: cli.summary,
        prompts,
    }
}

fn read_prompts_from_stdin() -> Vec<String> {
    std::io::stdin()
        .lock()
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli(command: CliCommand) -> Cli {
        Cli {
            command,
            headless: false,
            summary: false,
            heal: false,
            write: false,
            sandbox_id: None,
            new_sandbox: false,
            exit: false,
        }
    }

    #[test]
    fn run_command_maps_to_run_request_with_no_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.yaml");
        let request = to_run_request(base_cli(CliCommand::Run { file: file.clone() }));
        assert_eq!(request.command, Some(RunCommand::Run));
        assert_eq!(request.file, Some(file));
        assert!(request.prompts.is_empty());
    }

    #[test]
    fn init_command_carries_write_and_exit_flags_through() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new.yaml");
        let mut cli = base_cli(CliCommand::Init { file: file.clone() });
        cli.write = true;
        cli.exit = true;
        let request = to_run_request(cli);
        assert_eq!(request.command, Some(RunCommand::Init));
        assert!(request.write);
        assert!(request.exit);
    }

    #[test]
    fn sandbox_command_has_no_file_or_prompts() {
        let request = to_run_request(base_cli(CliCommand::Sandbox));
        assert_eq!(request.command, Some(RunCommand::Sandbox));
        assert!(request.file.is_none());
        assert!(request.prompts.is_empty());
    }
}
