//! TestDriver core: an AI-driven desktop-UI test automation agent.
//!
//! This crate implements the four coupled subsystems — the reasoning loop,
//! the command execution pipeline, the sandbox transport, and test-script
//! persistence & replay — behind the narrow external-collaborator traits in
//! [`ports`]. The CLI crate supplies argument parsing, terminal I/O, and a
//! concrete [`orchestrate::RunRequest`].

pub mod agent_loop;
pub mod commander;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod image_match;
pub mod js_exec;
#[cfg(feature = "native")]
pub mod native;
pub mod orchestrate;
pub mod outputs;
pub mod parser;
pub mod ports;
pub mod reasoning;
pub mod registry;
pub mod sandbox;
pub mod script;
pub mod session;

pub use error::{FatalError, TestDriverError};
pub use orchestrate::{start, Orchestrator, RunCommand, RunRequest};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;

    #[ctor]
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
