//! Crate-wide error aggregate.
//!
//! Each module defines its own small `thiserror` enum; [`TestDriverError`]
//! aggregates them at the orchestration boundary the way `loom-cli`'s
//! `RunError` aggregates node/runner errors. [`FatalError::is_fatal`]
//! implements the "any error with `fatal=true` bypasses heal" rule from the
//! error taxonomy.

use thiserror::Error;

use crate::agent_loop::AgentLoopError;
use crate::parser::ParseError;
use crate::reasoning::ReasoningError;
use crate::registry::RegistryError;
use crate::sandbox::SandboxError;
use crate::script::ScriptError;

/// Aggregate error type returned by `orchestrate::start` and friends.
#[derive(Debug, Error)]
pub enum TestDriverError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    AgentLoop(#[from] AgentLoopError),
}

/// Whether an error bypasses the heal loop and must terminate the run.
///
/// Version mismatches, max-attempts-exceeded, and loop-detection errors are
/// fatal; transport/IO, protocol, and primitive failures are not (they are
/// candidates for `haveAIResolveError`).
pub trait FatalError {
    fn is_fatal(&self) -> bool;
}

impl FatalError for TestDriverError {
    fn is_fatal(&self) -> bool {
        match self {
            TestDriverError::Script(e) => e.is_fatal(),
            TestDriverError::Parse(_) => false,
            TestDriverError::Reasoning(_) => false,
            TestDriverError::Sandbox(e) => e.is_fatal(),
            TestDriverError::Registry(e) => e.is_fatal(),
            TestDriverError::AgentLoop(e) => e.is_fatal(),
        }
    }
}
