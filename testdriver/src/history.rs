//! Execution History (C7, spec §4.7): the append-only record of what ran,
//! distinct from the persisted `Script` until snapshotted (I2, P2, P3).

use crate::script::{ExecutionHistoryEntry, ScriptStore, Step};

/// Append-only within a step, undo-capable across the whole run. Invariant
/// I2 ("the history's length is at least 1 whenever any prompt has been
/// accepted") is maintained by [`ExecutionHistory::push_step`] alone ever
/// growing the outer `Vec`.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    entries: Vec<ExecutionHistoryEntry>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Starts a new step for `prompt` with no commands yet recorded.
    pub fn push_step(&mut self, prompt: impl Into<String>) {
        self.entries.push(ExecutionHistoryEntry { prompt: prompt.into(), commands: Vec::new() });
    }

    /// Records one more successfully-executed command against the current
    /// (last) step. Satisfies P2: exactly one more command per primitive
    /// success.
    pub fn append_command(&mut self, command: crate::script::Command) {
        if let Some(last) = self.entries.last_mut() {
            last.commands.push(command);
        }
    }

    /// Undoes the last recorded action (P3, the inverse of append). Drops
    /// the last command of the current step; if that empties the step,
    /// drops the step itself. When `full` is set, drops the entire last step
    /// regardless of how many commands it holds.
    pub fn pop_tail(&mut self, full: bool) {
        let Some(last) = self.entries.last_mut() else { return };
        if full || last.commands.len() <= 1 {
            self.entries.pop();
            return;
        }
        last.commands.pop();
    }

    pub fn entries(&self) -> &[ExecutionHistoryEntry] {
        &self.entries
    }

    /// Materializes the history as persistable YAML at the current
    /// implementation version, via [`ScriptStore::snapshot`] and
    /// [`ScriptStore::dump`].
    pub fn snapshot_to_yaml(&self) -> Result<String, crate::script::ScriptError> {
        let steps: Vec<Step> = ScriptStore::snapshot(&self.entries);
        let bytes = ScriptStore::dump(&steps)?;
        Ok(String::from_utf8(bytes).expect("serde_yaml output is always valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Command;

    fn wait(ms: u64) -> Command {
        Command::Wait { timeout: ms }
    }

    #[test]
    fn push_step_keeps_length_invariant() {
        let mut history = ExecutionHistory::new();
        assert!(history.is_empty());
        history.push_step("open settings");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn append_command_grows_only_current_step() {
        let mut history = ExecutionHistory::new();
        history.push_step("wait a bit");
        history.append_command(wait(10));
        history.append_command(wait(20));
        assert_eq!(history.entries()[0].commands.len(), 2);
    }

    #[test]
    fn pop_tail_drops_last_command_then_empty_step() {
        let mut history = ExecutionHistory::new();
        history.push_step("wait a bit");
        history.append_command(wait(10));
        history.append_command(wait(20));

        history.pop_tail(false);
        assert_eq!(history.entries()[0].commands.len(), 1);

        history.pop_tail(false);
        assert!(history.is_empty());
    }

    #[test]
    fn pop_tail_full_drops_whole_step_regardless_of_command_count() {
        let mut history = ExecutionHistory::new();
        history.push_step("wait a bit");
        history.append_command(wait(10));
        history.append_command(wait(20));

        history.pop_tail(true);
        assert!(history.is_empty());
    }

    #[test]
    fn snapshot_round_trips_through_script_store() {
        let mut history = ExecutionHistory::new();
        history.push_step("open settings");
        history.append_command(wait(10));

        let yaml = history.snapshot_to_yaml().unwrap();
        let script: crate::script::Script = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(script.steps.len(), 1);
        assert_eq!(script.steps[0].prompt, "open settings");
    }
}
