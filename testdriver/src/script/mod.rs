//! Test Script Persistence & Replay (C1): the durable YAML model, version
//! gating, variable interpolation (spec §3, §4.1).

mod model;
mod store;

pub use model::{Command, ExecutionHistoryEntry, Script, ScriptVersion, Step};
pub use store::{interpolate, ScriptError, ScriptStore};
