//! Reasoning Loop (C8, spec §4.8): `exploratoryLoop` / `actOnMarkdown` /
//! `haveAIResolveError`, with error-fingerprint and completion-check bounds
//! (P7).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::commander::Commander;
use crate::error::FatalError;
use crate::history::ExecutionHistory;
use crate::parser::{self, ParseError};
use crate::ports::ScreenCapture;
use crate::reasoning::{ReasoningClient, ReasoningError};
use crate::registry::RegistryError;

const ERROR_LIMIT: u32 = 3;
const CHECK_LIMIT: u32 = 7;
/// Defensive cap on `actOnMarkdown` recursion depth; the real bounds are the
/// error-fingerprint tally and `checkCount` (spec §4.8, P7). This exists only
/// to stop a pathological reasoning response from recursing unboundedly.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum AgentLoopError {
    #[error("same error repeated more than {ERROR_LIMIT} times")]
    ErrorLimitExceeded,
    #[error("completion check exceeded {CHECK_LIMIT} iterations")]
    CheckLimitExceeded,
    #[error("markdown recursion exceeded depth {MAX_DEPTH}")]
    DepthExceeded,
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FatalError for AgentLoopError {
    fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentLoopError::ErrorLimitExceeded | AgentLoopError::CheckLimitExceeded | AgentLoopError::DepthExceeded
        )
    }
}

/// Drives one test prompt to completion against the reasoning service,
/// owning the [`ExecutionHistory`] it mutates.
pub struct AgentLoop {
    reasoning: Arc<ReasoningClient>,
    capture: Arc<dyn ScreenCapture>,
    commander: Commander,
    history: ExecutionHistory,
    error_tally: HashMap<String, u32>,
}

impl AgentLoop {
    pub fn new(reasoning: Arc<ReasoningClient>, capture: Arc<dyn ScreenCapture>, commander: Commander) -> Self {
        Self { reasoning, capture, commander, history: ExecutionHistory::new(), error_tally: HashMap::new() }
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Runs one prompt end to end. `dry` captures intent into history without
    /// calling the reasoning service (spec §6 CLI surface's dry-run mode).
    pub async fn exploratory_loop(
        &mut self,
        prompt: &str,
        dry: bool,
        validate_and_loop: bool,
    ) -> Result<(), AgentLoopError> {
        self.history.push_step(prompt);
        if dry {
            return Ok(());
        }

        let last_screenshot = self.capture.capture_primary().await.map_err(RegistryError::Port)?;
        let response = self
            .reasoning
            .call(
                "input",
                json!({
                    "prompt": prompt,
                    "mouse": serde_json::Value::Null,
                    "activeWindow": serde_json::Value::Null,
                    "image": encode(&last_screenshot),
                }),
            )
            .await?;
        let markdown = markdown_of(&response);
        self.act_on_markdown(&markdown, 0).await?;

        if validate_and_loop {
            let mut check_count: u32 = 0;
            loop {
                if check_count >= CHECK_LIMIT {
                    return Err(AgentLoopError::CheckLimitExceeded);
                }
                check_count += 1;

                let now_screenshot = self.capture.capture_primary().await.map_err(RegistryError::Port)?;
                let response = self
                    .reasoning
                    .call(
                        "check",
                        json!({
                            "tasks": self.history.entries().iter().map(|e| e.prompt.clone()).collect::<Vec<_>>(),
                            "images": [encode(&last_screenshot), encode(&now_screenshot)],
                            "mouse": serde_json::Value::Null,
                            "activeWindow": serde_json::Value::Null,
                        }),
                    )
                    .await?;
                let markdown = markdown_of(&response);
                if parser::extract_codeblocks(&markdown).is_empty() {
                    break;
                }
                self.act_on_markdown(&markdown, 0).await?;
            }
        }

        Ok(())
    }

    /// Extracts codeblocks from `content`, decodes each, and runs its
    /// commands one at a time so a primitive failure can be healed without
    /// discarding already-decoded sibling blocks (spec §4.8 step 3-4).
    fn act_on_markdown<'a>(
        &'a mut self,
        content: &'a str,
        depth: usize,
    ) -> futures::future::BoxFuture<'a, Result<(), AgentLoopError>> {
        use futures::future::FutureExt;
        async move {
            if depth > MAX_DEPTH {
                return Err(AgentLoopError::DepthExceeded);
            }

            let blocks = parser::extract_codeblocks(content);
            if blocks.is_empty() {
                return Err(AgentLoopError::Parse(ParseError::NoCodeblock));
            }

            for block in blocks {
                let commands = match parser::get_commands(&block) {
                    Ok(commands) => commands,
                    Err(e) => return self.have_ai_resolve_error(&e.to_string(), &block, depth, true).await,
                };
                for command in &commands {
                    let one = std::slice::from_ref(command);
                    if let Err(e) = self.commander.run_commands(one, &mut self.history).await {
                        return self.have_ai_resolve_error(&e.to_string(), &block, depth, true).await;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Heals a failure by tallying its fingerprint, rolling back history
    /// (`undo`), and asking the reasoning service for replacement markdown
    /// to re-enter `actOnMarkdown` with (spec §4.8 step 4, §7 Protocol /
    /// Primitive-failure healing).
    fn have_ai_resolve_error<'a>(
        &'a mut self,
        description: &'a str,
        markdown_source: &'a str,
        depth: usize,
        undo: bool,
    ) -> futures::future::BoxFuture<'a, Result<(), AgentLoopError>> {
        use futures::future::FutureExt;
        async move {
            if undo {
                self.history.pop_tail(false);
            }

            let fingerprint = description.to_string();
            let count = self.error_tally.entry(fingerprint).or_insert(0);
            *count += 1;
            if *count > ERROR_LIMIT {
                return Err(AgentLoopError::ErrorLimitExceeded);
            }

            let response = self
                .reasoning
                .call("error", json!({"description": description, "markdown": markdown_source}))
                .await?;
            let markdown = markdown_of(&response);
            self.act_on_markdown(&markdown, depth + 1).await
        }
        .boxed()
    }
}

fn markdown_of(response: &serde_json::Value) -> String {
    response.get("markdown").and_then(serde_json::Value::as_str).unwrap_or_default().to_string()
}

fn encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_limit_and_check_limit_are_fatal() {
        assert!(AgentLoopError::ErrorLimitExceeded.is_fatal());
        assert!(AgentLoopError::CheckLimitExceeded.is_fatal());
    }

    #[test]
    fn parse_error_is_not_fatal() {
        let err = AgentLoopError::Parse(ParseError::NoCodeblock);
        assert!(!err.is_fatal());
    }

    #[test]
    fn markdown_of_reads_the_markdown_field() {
        let response = json!({"markdown": "```yaml\ncommands: []\n```"});
        assert!(markdown_of(&response).contains("commands"));
    }
}
