//! Reasoning Client (C3, spec §4.3): posts reasoning requests, consumes
//! streaming chunked responses, correlates the process-wide session.

mod client;
mod types;

pub use client::{ReasoningClient, ReasoningError};
pub use types::StreamChunk;
