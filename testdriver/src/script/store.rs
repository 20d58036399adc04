//! Script Store (C1, spec §4.1): `load`, `dump`, `interpolate`.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::error::FatalError;

use super::model::{ExecutionHistoryEntry, Script, ScriptVersion, Step};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script not found: {0}")]
    FileNotFound(String),
    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("version mismatch: script is v{found}, current is v{current}")]
    VersionMismatch { found: ScriptVersion, current: ScriptVersion },
}

impl FatalError for ScriptError {
    /// Version mismatch is fatal (I5); malformed YAML and missing files are
    /// not load-time fatal on their own (the caller decides how to surface
    /// them, matching the Protocol error kind in the taxonomy).
    fn is_fatal(&self) -> bool {
        matches!(self, ScriptError::VersionMismatch { .. })
    }
}

static INTERPOLATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\\)?\$\{([A-Za-z0-9_]+)\}").unwrap());

/// Variable substitution (I6, P5): replaces `${K}` with `vars[K]` verbatim;
/// leaves `${K}` untouched when `K` is absent from `vars`; `\${K}` decodes to
/// the literal `${K}` with exactly one leading backslash stripped.
///
/// The source performs this as plain string substitution with no quoting of
/// inserted values (spec §9 Open Question): a value containing YAML
/// metacharacters can break the document that is parsed afterwards. This
/// implementation preserves that behavior rather than silently fixing it.
pub fn interpolate(text: &str, vars: &HashMap<String, String>) -> String {
    INTERPOLATE_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let key = &caps[2];
            if caps.get(1).is_some() {
                format!("${{{key}}}")
            } else {
                match vars.get(key) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            }
        })
        .into_owned()
}

/// Loads and persists [`Script`] documents (spec §4.1).
pub struct ScriptStore;

impl ScriptStore {
    /// Loads a script from `path`, applying environment interpolation then
    /// `interpolation_vars` interpolation before YAML parsing (I6), and
    /// rejecting version-incompatible documents (I5, P6).
    pub fn load(
        path: &Path,
        env_vars: &HashMap<String, String>,
        interpolation_vars: &HashMap<String, String>,
    ) -> Result<Script, ScriptError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ScriptError::FileNotFound(path.display().to_string()))?;
        Self::load_str(&raw, env_vars, interpolation_vars)
    }

    /// As [`ScriptStore::load`] but from an in-memory string (used by tests
    /// and by `run{file}` embedding).
    pub fn load_str(
        raw: &str,
        env_vars: &HashMap<String, String>,
        interpolation_vars: &HashMap<String, String>,
    ) -> Result<Script, ScriptError> {
        let pass1 = interpolate(raw, env_vars);
        let pass2 = interpolate(&pass1, interpolation_vars);
        let script: Script = serde_yaml::from_str(&pass2)?;
        if !script.version.compatible_with(ScriptVersion::CURRENT) {
            return Err(ScriptError::VersionMismatch {
                found: script.version,
                current: ScriptVersion::CURRENT,
            });
        }
        Ok(script)
    }

    /// Serializes `steps` under the current version, preserving key order
    /// within each Command (`version` then `steps`, per §6). Splicing new
    /// step bodies after existing file comments is a best-effort concern of
    /// the caller writing the file, not of this serialization step.
    pub fn dump(steps: &[Step]) -> Result<Vec<u8>, ScriptError> {
        let script = Script { version: ScriptVersion::CURRENT, steps: steps.to_vec() };
        Ok(serde_yaml::to_string(&script)?.into_bytes())
    }

    /// Converts execution-history entries (what actually ran) into `Step`s
    /// ready for [`ScriptStore::dump`].
    pub fn snapshot(history: &[ExecutionHistoryEntry]) -> Vec<Step> {
        history.iter().map(Step::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn interpolate_substitutes_known_vars() {
        let v = vars(&[("NAME", "Chrome")]);
        assert_eq!(interpolate("open ${NAME}", &v), "open Chrome");
    }

    #[test]
    fn interpolate_is_identity_for_unknown_vars() {
        let v = vars(&[]);
        assert_eq!(interpolate("open ${NAME}", &v), "open ${NAME}");
    }

    #[test]
    fn interpolate_unescapes_backslash_once() {
        let v = vars(&[("NAME", "Chrome")]);
        assert_eq!(interpolate(r"literal \${NAME}", &v), "literal ${NAME}");
    }

    #[test]
    fn interpolate_is_idempotent_when_unresolved() {
        let v = vars(&[]);
        let once = interpolate("${A} and ${B}", &v);
        let twice = interpolate(&once, &v);
        assert_eq!(once, twice);
    }

    #[test]
    fn round_trip_script_via_dump_and_load() {
        let steps = vec![Step {
            prompt: "open browser".into(),
            commands: vec![
                super::super::model::Command::FocusApplication { name: "Chrome".into() },
                super::super::model::Command::Wait { timeout: 1000 },
            ],
        }];
        let bytes = ScriptStore::dump(&steps).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let loaded = ScriptStore::load_str(&text, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(loaded.steps[0].commands.len(), 2);
    }

    #[test]
    fn load_rejects_major_version_mismatch() {
        let text = "version: v7.0.0\nsteps: []\n";
        let err = ScriptStore::load_str(text, &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ScriptError::VersionMismatch { .. }));
    }

    #[test]
    fn load_rejects_minor_version_ahead_of_current() {
        let text = format!("version: v{}.{}.0\nsteps: []\n", ScriptVersion::CURRENT.major, ScriptVersion::CURRENT.minor + 1);
        let err = ScriptStore::load_str(&text, &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ScriptError::VersionMismatch { .. }));
    }
}
