//! Parser (C2, spec §4.2): extracts fenced `yaml`/`yml` code blocks from a
//! markdown blob returned by the reasoning service and decodes each into
//! commands.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::script::Command;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no yaml codeblock found in markdown")]
    NoCodeblock,
    #[error("invalid yaml in codeblock: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("codeblock has neither `commands` nor `steps` with commands")]
    EmptyCommands,
}

static FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:yaml|yml)\s*\n(.*?)```").unwrap());

/// Extracts every fenced `yaml`/`yml` block from `markdown`, in document order.
pub fn extract_codeblocks(markdown: &str) -> Vec<String> {
    FENCE_PATTERN
        .captures_iter(markdown)
        .map(|c| c[1].to_string())
        .collect()
}

/// A decoded block: either a flat `commands` list or one or more `steps`,
/// each carrying its own `commands`.
#[derive(Debug, Deserialize)]
struct StepsWrapper {
    #[serde(default)]
    commands: Option<Vec<Command>>,
    #[serde(default)]
    steps: Option<Vec<StepLike>>,
}

#[derive(Debug, Deserialize)]
struct StepLike {
    #[serde(default)]
    commands: Vec<Command>,
}

/// Decodes one YAML codeblock body and returns its commands, flattening
/// `steps[*].commands` when `commands` is absent. A block that decodes to
/// neither shape, or whose commands are empty, is a [`ParseError`].
pub fn get_commands(block: &str) -> Result<Vec<Command>, ParseError> {
    let wrapper: StepsWrapper = serde_yaml::from_str(block)?;
    let commands = match (wrapper.commands, wrapper.steps) {
        (Some(cmds), _) => cmds,
        (None, Some(steps)) => steps.into_iter().flat_map(|s| s.commands).collect(),
        (None, None) => Vec::new(),
    };
    if commands.is_empty() {
        return Err(ParseError::EmptyCommands);
    }
    Ok(commands)
}

/// Extracts codeblocks from `markdown` and decodes the first one found.
/// Fails with [`ParseError::NoCodeblock`] if there is no fenced yaml/yml
/// block at all.
pub fn parse_markdown(markdown: &str) -> Result<Vec<Vec<Command>>, ParseError> {
    let blocks = extract_codeblocks(markdown);
    if blocks.is_empty() {
        return Err(ParseError::NoCodeblock);
    }
    blocks.iter().map(|b| get_commands(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_codeblocks_finds_yaml_and_yml_fences() {
        let md = "text\n```yaml\ncommands:\n  - command: wait\n    timeout: 10\n```\nmore\n```yml\ncommands: []\n```\n";
        let blocks = extract_codeblocks(md);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn get_commands_flattens_steps() {
        let block = "steps:\n  - commands:\n      - command: wait\n        timeout: 5\n  - commands:\n      - command: wait\n        timeout: 10\n";
        let cmds = get_commands(block).unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn get_commands_fails_on_empty() {
        let block = "commands: []\n";
        assert!(matches!(get_commands(block), Err(ParseError::EmptyCommands)));
    }

    #[test]
    fn get_commands_fails_on_missing_keys() {
        let block = "foo: bar\n";
        assert!(matches!(get_commands(block), Err(ParseError::EmptyCommands)));
    }

    #[test]
    fn parse_markdown_fails_with_no_codeblock() {
        assert!(matches!(parse_markdown("just prose"), Err(ParseError::NoCodeblock)));
    }

    #[test]
    fn heal_scenario_missing_keys_then_retry() {
        // Scenario: reasoning service returns a codeblock missing `keys`;
        // parser decodes `PressKeys` fine but a later validation elsewhere
        // would reject it; after heal the retried block is well-formed.
        let bad = "command: press-keys\n";
        let wrapper_err = serde_yaml::from_str::<StepsWrapper>(bad);
        assert!(wrapper_err.is_ok()); // top-level shape decodes; "commands" key is simply absent
        let good = "commands:\n  - command: press-keys\n    keys: [enter]\n";
        let cmds = get_commands(good).unwrap();
        assert_eq!(cmds.len(), 1);
    }
}
