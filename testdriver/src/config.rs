//! Environment-driven configuration (spec §6) and a non-secret summary for
//! startup logging, in the shape of `loom`'s `ConfigSection`/`RunConfigSummary`
//! (`config/summary/mod.rs`), generalized to TestDriver's `TD_*` variables.

use std::collections::HashMap;
use std::io::Write;

/// Recognized `TD_*` environment variables (spec §6). Unknown `TD_*` names
/// are preserved verbatim in `extra` with best-effort boolean coercion left
/// to the caller (they are passed through as strings).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_root: String,
    pub api_key: Option<String>,
    pub analytics: bool,
    pub resolution: Option<(u32, u32)>,
    pub speak: bool,
    pub notify: bool,
    pub minimize: bool,
    pub overlay: bool,
    pub vm: bool,
    pub interpolation_vars: HashMap<String, String>,
    pub ci: bool,
    /// Unrecognized `TD_*` variables, captured verbatim.
    pub extra: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_root: "https://api.testdriver.ai".to_string(),
            api_key: None,
            analytics: true,
            resolution: None,
            speak: false,
            notify: false,
            minimize: false,
            overlay: true,
            vm: false,
            interpolation_vars: HashMap::new(),
            ci: false,
            extra: HashMap::new(),
        }
    }
}

fn coerce_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_resolution(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once('x').or_else(|| raw.split_once('X'))?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl Config {
    /// Loads config from the process environment. Never panics; malformed
    /// values fall back to the field's default.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        let known = [
            "TD_API_ROOT",
            "TD_API_KEY",
            "TD_ANALYTICS",
            "TD_RESOLUTION",
            "TD_SPEAK",
            "TD_NOTIFY",
            "TD_MINIMIZE",
            "TD_OVERLAY",
            "TD_VM",
            "TD_INTERPOLATION_VARS",
            "CI",
        ];

        if let Ok(v) = std::env::var("TD_API_ROOT") {
            cfg.api_root = v;
        }
        cfg.api_key = std::env::var("TD_API_KEY").ok();
        if let Ok(v) = std::env::var("TD_ANALYTICS") {
            cfg.analytics = coerce_bool(&v, cfg.analytics);
        }
        if let Ok(v) = std::env::var("TD_RESOLUTION") {
            cfg.resolution = parse_resolution(&v);
        }
        if let Ok(v) = std::env::var("TD_SPEAK") {
            cfg.speak = coerce_bool(&v, cfg.speak);
        }
        if let Ok(v) = std::env::var("TD_NOTIFY") {
            cfg.notify = coerce_bool(&v, cfg.notify);
        }
        if let Ok(v) = std::env::var("TD_MINIMIZE") {
            cfg.minimize = coerce_bool(&v, cfg.minimize);
        }
        if let Ok(v) = std::env::var("TD_OVERLAY") {
            cfg.overlay = coerce_bool(&v, cfg.overlay);
        }
        if let Ok(v) = std::env::var("TD_VM") {
            cfg.vm = coerce_bool(&v, cfg.vm);
        }
        if let Ok(v) = std::env::var("TD_INTERPOLATION_VARS") {
            if let Ok(map) = serde_json::from_str::<HashMap<String, String>>(&v) {
                cfg.interpolation_vars = map;
            }
        }
        if let Ok(v) = std::env::var("CI") {
            cfg.ci = coerce_bool(&v, cfg.ci);
        }

        for (key, value) in std::env::vars() {
            if key.starts_with("TD_") && !known.contains(&key.as_str()) {
                cfg.extra.insert(key, value);
            }
        }

        cfg
    }
}

/// One block of config for display and logging, in the shape of `loom`'s
/// `ConfigSection` trait.
pub trait ConfigSection: Send + Sync {
    /// Section label, e.g. `"reasoning"`, `"sandbox"`.
    fn section_name(&self) -> &str;
    /// Key-value pairs. Never includes `api_key`.
    fn entries(&self) -> Vec<(&'static str, String)>;
    /// Emits one `tracing::info!` line in the form `[section] k=v k=v`.
    fn log(&self) {
        let entries: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        tracing::info!(section = self.section_name(), "{}", entries.join(" "));
    }
}

/// Reasoning-service section of the config summary (never includes the key).
pub struct ReasoningConfigSummary {
    pub api_root: String,
    pub has_api_key: bool,
}

impl ConfigSection for ReasoningConfigSummary {
    fn section_name(&self) -> &str {
        "reasoning"
    }
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("api_root", self.api_root.clone()),
            ("api_key", if self.has_api_key { "set".into() } else { "unset".into() }),
        ]
    }
}

/// Sandbox/session section of the config summary.
pub struct SessionConfigSummary {
    pub vm: bool,
    pub resolution: Option<(u32, u32)>,
}

impl ConfigSection for SessionConfigSummary {
    fn section_name(&self) -> &str {
        "session"
    }
    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("vm", self.vm.to_string()),
            (
                "resolution",
                self.resolution
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .unwrap_or_else(|| "auto".to_string()),
            ),
        ]
    }
}

/// Aggregated, orderable set of config sections, mirroring `RunConfigSummary`.
pub struct RunConfigSummary {
    sections: Vec<Box<dyn ConfigSection>>,
}

impl RunConfigSummary {
    pub fn new() -> Self {
        Self { sections: vec![] }
    }

    pub fn with_section(mut self, s: Box<dyn ConfigSection>) -> Self {
        self.sections.push(s);
        self
    }

    pub fn sections(&self) -> &[Box<dyn ConfigSection>] {
        &self.sections
    }

    pub fn log_all(&self) {
        for s in &self.sections {
            s.log();
        }
    }
}

impl Default for RunConfigSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Builds the startup log summary for this config.
    pub fn summary(&self) -> RunConfigSummary {
        RunConfigSummary::new()
            .with_section(Box::new(ReasoningConfigSummary {
                api_root: self.api_root.clone(),
                has_api_key: self.api_key.is_some(),
            }))
            .with_section(Box::new(SessionConfigSummary {
                vm: self.vm,
                resolution: self.resolution,
            }))
    }

    /// Writes the summary to stderr, for `--verbose` style invocation; kept
    /// separate from `tracing` output so it works even without a subscriber.
    pub fn print_summary_to_stderr(&self) {
        for s in self.summary().sections() {
            let entries: Vec<String> = s
                .entries()
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let _ = writeln!(std::io::stderr(), "[{}] {}", s.section_name(), entries.join(" "));
        }
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_bool_defaults_on_garbage() {
        assert!(coerce_bool("nonsense", true));
        assert!(!coerce_bool("nonsense", false));
        assert!(coerce_bool("true", false));
        assert!(!coerce_bool("0", true));
    }

    #[test]
    fn parse_resolution_accepts_wxh() {
        assert_eq!(parse_resolution("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_resolution("bogus"), None);
    }

    #[test]
    fn default_config_has_no_api_key() {
        let cfg = Config::default();
        assert!(cfg.api_key.is_none());
        assert!(!cfg.summary().sections().is_empty());
    }
}
