//! Minimal interfaces for out-of-scope external collaborators (spec §1, §6;
//! SPEC_FULL.md supplement): CLI parsing, env loading, overlay renderer,
//! terminal focus, analytics, TTS, notifications, screenshot/input
//! primitives, reporters, setup wizard, markdown pretty-printing are all
//! consumed through a narrow trait rather than implemented here.
//!
//! Grounded in `loom`'s `tool_source::ToolSource` seam: the core depends on
//! a trait object, never a concrete backend, so swapping local/remote/mock
//! implementations needs no change to call sites.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("input driver error: {0}")]
    Input(String),
    #[error("screen capture error: {0}")]
    Capture(String),
    #[error("exec error: {0}")]
    Exec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Local OS input driver seam (mouse/keyboard primitives; out of scope per
/// spec §1 except for this interface). The `native` feature provides a real
/// enigo-backed implementation; otherwise only [`NullInputDriver`] and the
/// remote-sandbox path exist.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn move_mouse(&self, x: i32, y: i32) -> Result<(), PortError>;
    async fn click(&self, button: MouseButton) -> Result<(), PortError>;
    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<(), PortError>;
    async fn key_tap(&self, key: &str) -> Result<(), PortError>;
    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), PortError>;
}

/// Local screen capture seam; returns PNG bytes of the primary display.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_primary(&self) -> Result<Vec<u8>, PortError>;
}

/// Fire-and-forget desktop notification seam (out of scope; default no-op).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Fire-and-forget text-to-speech seam (out of scope; default no-op).
pub trait Speaker: Send + Sync {
    fn speak(&self, message: &str);
}

/// Fire-and-forget analytics sink seam (out of scope; default no-op).
pub trait Analytics: Send + Sync {
    fn track(&self, event: &str, props: serde_json::Value);
}

/// Renders a final human-readable summary before a fatal exit (spec §7:
/// "Summarize is always invoked before exit(1)"). Markdown pretty-printing
/// is out of scope, so the default implementation renders plain text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, history: &[crate::script::ExecutionHistoryEntry]) -> String;
}

/// No-op input driver for tests and headless runs without the `native`
/// feature.
pub struct NullInputDriver;

#[async_trait]
impl InputDriver for NullInputDriver {
    async fn move_mouse(&self, _x: i32, _y: i32) -> Result<(), PortError> {
        Ok(())
    }
    async fn click(&self, _button: MouseButton) -> Result<(), PortError> {
        Ok(())
    }
    async fn type_text(&self, _text: &str, _delay_ms: u64) -> Result<(), PortError> {
        Ok(())
    }
    async fn key_tap(&self, _key: &str) -> Result<(), PortError> {
        Ok(())
    }
    async fn scroll(&self, _dx: i32, _dy: i32) -> Result<(), PortError> {
        Ok(())
    }
}

/// No-op screen capture returning an empty 1x1 PNG-shaped buffer.
pub struct NullScreenCapture;

#[async_trait]
impl ScreenCapture for NullScreenCapture {
    async fn capture_primary(&self) -> Result<Vec<u8>, PortError> {
        Ok(Vec::new())
    }
}

pub struct NullNotifier;
impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}

pub struct NullSpeaker;
impl Speaker for NullSpeaker {
    fn speak(&self, _message: &str) {}
}

pub struct NullAnalytics;
impl Analytics for NullAnalytics {
    fn track(&self, _event: &str, _props: serde_json::Value) {}
}

/// Plain-text history summarizer (default).
pub struct PlainSummarizer;
impl Summarizer for PlainSummarizer {
    fn summarize(&self, history: &[crate::script::ExecutionHistoryEntry]) -> String {
        let mut out = String::new();
        for entry in history {
            out.push_str(&format!("- {} ({} commands)\n", entry.prompt, entry.commands.len()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_input_driver_never_errors() {
        let driver = NullInputDriver;
        assert!(driver.move_mouse(1, 2).await.is_ok());
        assert!(driver.click(MouseButton::Left).await.is_ok());
    }

    #[test]
    fn plain_summarizer_lists_prompts_and_counts() {
        let history = vec![crate::script::ExecutionHistoryEntry {
            prompt: "open browser".to_string(),
            commands: vec![],
        }];
        let summary = PlainSummarizer.summarize(&history);
        assert!(summary.contains("open browser"));
        assert!(summary.contains("0 commands"));
    }
}
