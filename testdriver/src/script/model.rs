//! Data model (spec §3): `Script`, `Step`, `Command` (tagged variants),
//! `ExecutionHistoryEntry`, `ScriptVersion`.
//!
//! Serialization is `serde` + `serde_yaml`, grounded in `loom`'s
//! `tool_source/yaml_specs.rs` (`serde_yaml::from_str` over an embedded/loaded
//! document).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic version triple parsed from `v?MAJOR.MINOR.PATCH` (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScriptVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ScriptVersion {
    /// Current implementation version (an Open Question in spec §9 scopes
    /// only the dialect table; this constant is a direct decision, recorded
    /// in DESIGN.md).
    pub const CURRENT: ScriptVersion = ScriptVersion { major: 1, minor: 0, patch: 0 };

    /// Replay precondition (I5, P6): `major` must agree exactly; `minor` on
    /// the file must not exceed `current.minor`.
    pub fn compatible_with(&self, current: ScriptVersion) -> bool {
        self.major == current.major && self.minor <= current.minor
    }
}

impl FromStr for ScriptVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let mut parts = trimmed.splitn(3, '.');
        let mut next = |label: &str| -> Result<u64, String> {
            parts
                .next()
                .ok_or_else(|| format!("missing {label} in version {s:?}"))?
                .parse::<u64>()
                .map_err(|e| format!("invalid {label} in version {s:?}: {e}"))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        Ok(ScriptVersion { major, minor, patch })
    }
}

impl TryFrom<String> for ScriptVersion {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScriptVersion> for String {
    fn from(value: ScriptVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScriptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A persisted test script (spec §3, §6): `version` then ordered `steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub version: ScriptVersion,
    pub steps: Vec<Step>,
}

/// One human intent mapped to the concrete actions that satisfied it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub prompt: String,
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// The authoritative record of what actually executed for one prompt.
///
/// Structurally identical to [`Step`] but kept as a distinct type: I2 and
/// the append-only growth rule apply to this type only, never to a `Step`
/// loaded from disk before it has been executed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionHistoryEntry {
    pub prompt: String,
    pub commands: Vec<Command>,
}

impl From<&ExecutionHistoryEntry> for Step {
    fn from(entry: &ExecutionHistoryEntry) -> Self {
        Step { prompt: entry.prompt.clone(), commands: entry.commands.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickAction {
    Click,
    RightClick,
    DoubleClick,
    Hover,
    DragStart,
    DragEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMethod {
    Mouse,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMatchMethod {
    Turbo,
    Leven,
    Dice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecLanguage {
    Shell,
    Js,
}

/// A single concrete action (spec §3): tagged by `command`, the registry's
/// closed dispatch set (spec §9 "tagged variants replace string-keyed
/// dispatch").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Type {
        text: String,
        #[serde(default)]
        delay: u64,
    },
    PressKeys {
        keys: Vec<String>,
    },
    Click {
        x: i32,
        y: i32,
        action: ClickAction,
    },
    Hover {
        x: i32,
        y: i32,
    },
    Scroll {
        direction: ScrollDirection,
        amount: i32,
        method: ScrollMethod,
    },
    HoverText {
        text: String,
        #[serde(default)]
        description: Option<String>,
        action: ClickAction,
        method: TextMatchMethod,
    },
    HoverImage {
        description: String,
        action: ClickAction,
    },
    MatchImage {
        path: String,
        action: ClickAction,
        #[serde(default)]
        invert: bool,
    },
    Wait {
        timeout: u64,
    },
    WaitForText {
        text: String,
        timeout: u64,
        method: TextMatchMethod,
    },
    WaitForImage {
        description: String,
        timeout: u64,
    },
    ScrollUntilText {
        text: String,
        direction: ScrollDirection,
        #[serde(rename = "max-distance")]
        max_distance: i32,
        #[serde(default)]
        method: Option<ScrollMethod>,
    },
    ScrollUntilImage {
        description: String,
        direction: ScrollDirection,
        #[serde(rename = "max-distance")]
        max_distance: i32,
    },
    Assert {
        expect: String,
        #[serde(default, rename = "async")]
        async_: bool,
    },
    Remember {
        description: String,
        value: String,
    },
    FocusApplication {
        name: String,
    },
    Exec {
        language: ExecLanguage,
        #[serde(default)]
        mac: Option<String>,
        #[serde(default)]
        windows: Option<String>,
        #[serde(default)]
        linux: Option<String>,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        silent: bool,
    },
    Run {
        file: String,
    },
    If {
        condition: String,
        #[serde(default, rename = "then")]
        then_branch: Vec<Command>,
        #[serde(default, rename = "else")]
        else_branch: Vec<Command>,
    },
}

impl Command {
    /// A short human-readable label for logging/events, e.g. `"click"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Type { .. } => "type",
            Command::PressKeys { .. } => "press-keys",
            Command::Click { .. } => "click",
            Command::Hover { .. } => "hover",
            Command::Scroll { .. } => "scroll",
            Command::HoverText { .. } => "hover-text",
            Command::HoverImage { .. } => "hover-image",
            Command::MatchImage { .. } => "match-image",
            Command::Wait { .. } => "wait",
            Command::WaitForText { .. } => "wait-for-text",
            Command::WaitForImage { .. } => "wait-for-image",
            Command::ScrollUntilText { .. } => "scroll-until-text",
            Command::ScrollUntilImage { .. } => "scroll-until-image",
            Command::Assert { .. } => "assert",
            Command::Remember { .. } => "remember",
            Command::FocusApplication { .. } => "focus-application",
            Command::Exec { .. } => "exec",
            Command::Run { .. } => "run",
            Command::If { .. } => "if",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_with_and_without_v_prefix() {
        assert_eq!("1.2.3".parse::<ScriptVersion>().unwrap(), ScriptVersion { major: 1, minor: 2, patch: 3 });
        assert_eq!("v1.2.3".parse::<ScriptVersion>().unwrap(), ScriptVersion { major: 1, minor: 2, patch: 3 });
    }

    #[test]
    fn version_compatibility_matches_p6() {
        let current = ScriptVersion { major: 1, minor: 5, patch: 0 };
        assert!(ScriptVersion { major: 1, minor: 5, patch: 9 }.compatible_with(current));
        assert!(ScriptVersion { major: 1, minor: 0, patch: 0 }.compatible_with(current));
        assert!(!ScriptVersion { major: 1, minor: 6, patch: 0 }.compatible_with(current));
        assert!(!ScriptVersion { major: 2, minor: 0, patch: 0 }.compatible_with(current));
    }

    #[test]
    fn click_command_roundtrips_through_yaml() {
        let cmd = Command::Click { x: 10, y: 20, action: ClickAction::Click };
        let yaml = serde_yaml::to_string(&cmd).unwrap();
        let back: Command = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.kind(), "click");
    }

    #[test]
    fn scroll_until_text_accepts_max_distance_kebab_key() {
        let yaml = "command: scroll-until-text\ntext: Continue\ndirection: down\nmax-distance: 1200\n";
        let cmd: Command = serde_yaml::from_str(yaml).unwrap();
        match cmd {
            Command::ScrollUntilText { max_distance, .. } => assert_eq!(max_distance, 1200),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn if_command_nests_command_vectors() {
        let yaml = "command: if\ncondition: \"foo\"\nthen:\n  - command: wait\n    timeout: 10\nelse: []\n";
        let cmd: Command = serde_yaml::from_str(yaml).unwrap();
        match cmd {
            Command::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert!(else_branch.is_empty());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
