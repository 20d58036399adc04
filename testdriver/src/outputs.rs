//! Inter-command named outputs (spec §3, §4.9): a flat map populated by
//! `exec` and substituted into later commands via `${OUTPUT.name}`.

use dashmap::DashMap;

/// Flat `name -> value` map. `set` unconditionally overwrites; `get` returns
/// `""` on miss (never an error — unresolved tokens are left literal by the
/// caller, not here).
#[derive(Debug, Default)]
pub struct Outputs {
    values: DashMap<String, String>,
}

impl Outputs {
    pub fn new() -> Self {
        Self { values: DashMap::new() }
    }

    /// Overwrites `name` with `value` unconditionally.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the stored value, or `""` if `name` was never set.
    pub fn get(&self, name: &str) -> String {
        self.values
            .get(name)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Substitutes every `${OUTPUT.name}` token in `text` textually; a token
    /// for a name that was never set resolves to `""` (via `get`), matching
    /// the Commander substitution rule. Tokens with no matching `OUTPUT.`
    /// prefix are left untouched.
    pub fn substitute(&self, text: &str) -> String {
        static PATTERN: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new(r"\$\{OUTPUT\.([A-Za-z0-9_]+)\}").unwrap());
        PATTERN
            .replace_all(text, |caps: &regex::Captures| self.get(&caps[1]))
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_miss_returns_empty_string() {
        let outputs = Outputs::new();
        assert_eq!(outputs.get("missing"), "");
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let outputs = Outputs::new();
        outputs.set("a", "1");
        outputs.set("a", "2");
        assert_eq!(outputs.get("a"), "2");
    }

    #[test]
    fn substitute_replaces_known_tokens_and_blanks_unknown() {
        let outputs = Outputs::new();
        outputs.set("name", "Chrome");
        let text = "focus ${OUTPUT.name} then ${OUTPUT.missing} end";
        assert_eq!(outputs.substitute(text), "focus Chrome then  end");
    }
}
