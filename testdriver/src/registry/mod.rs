//! Command Registry (spec §4.5, C5): one function per primitive, grouped by
//! concern across submodules, plus the shared [`RegistryError`] they return.

pub mod input;
pub mod redraw;
pub mod semantic;
pub mod sync;
pub mod vision;

use thiserror::Error;

use crate::error::FatalError;
use crate::ports::PortError;
use crate::reasoning::ReasoningError;
use crate::sandbox::SandboxError;

/// Failures from executing a single command primitive. None of these are
/// fatal to the run on their own (spec §7: a primitive failure is handled by
/// the agent loop's heal path, not escalated) — fatality is carried by the
/// wrapped transport/service errors where the taxonomy marks them so.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("input/capture port error: {0}")]
    Port(#[from] PortError),
    #[error("sandbox transport error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("reasoning service error: {0}")]
    Reasoning(#[from] ReasoningError),
    #[error("invalid primitive invocation: {0}")]
    InvalidPrimitive(String),
    #[error("exec failed: {0}")]
    Exec(String),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("timed out waiting for condition")]
    Timeout,
}

impl FatalError for RegistryError {
    fn is_fatal(&self) -> bool {
        match self {
            RegistryError::Sandbox(e) => e.is_fatal(),
            RegistryError::Reasoning(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_primitive_is_not_fatal() {
        let err = RegistryError::InvalidPrimitive("bad".to_string());
        assert!(!err.is_fatal());
    }

    #[test]
    fn timeout_is_not_fatal() {
        assert!(!RegistryError::Timeout.is_fatal());
    }
}
