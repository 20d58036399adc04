//! Commander (C6, spec §4.6): dispatches one [`Command`] at a time to the
//! registry, substituting `${OUTPUT.*}` tokens first, then reports the run
//! back to the reasoning service and to analytics.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use serde_json::json;

use crate::events::{Event, EventBus};
use crate::history::ExecutionHistory;
use crate::outputs::Outputs;
use crate::ports::{Analytics, InputDriver, ScreenCapture};
use crate::reasoning::ReasoningClient;
use crate::registry::{input, semantic, sync, vision, RegistryError};
use crate::sandbox::SandboxTransport;
use crate::script::{Command, ScriptStore};

/// Holds the collaborators every primitive needs; one instance per run.
pub struct Commander {
    pub input: Arc<dyn InputDriver>,
    pub capture: Arc<dyn ScreenCapture>,
    pub reasoning: Arc<ReasoningClient>,
    pub sandbox: Option<Arc<SandboxTransport>>,
    pub outputs: Arc<Outputs>,
    pub events: Arc<EventBus>,
    pub analytics: Arc<dyn Analytics>,
}

impl Commander {
    /// Runs every command in `commands` in order against `history`, stopping
    /// at the first failure (the agent loop decides whether to heal and
    /// retry from there).
    pub fn run_commands<'a>(
        &'a self,
        commands: &'a [Command],
        history: &'a mut ExecutionHistory,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        async move {
            for command in commands {
                self.dispatch_one(command, history).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn sandbox_ref(&self) -> Option<&SandboxTransport> {
        self.sandbox.as_deref()
    }

    fn dispatch_one<'a>(
        &'a self,
        command: &'a Command,
        history: &'a mut ExecutionHistory,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        async move {
            self.events.publish(Event::CommandStart(command.kind().to_string()));
            let started = Instant::now();

            let result = self.execute(command, history).await;

            match &result {
                Ok(()) => {
                    self.events.publish(Event::CommandSuccess(command.kind().to_string()));
                    history.append_command(command.clone());
                    self.report_ran(command, started.elapsed().as_millis() as u64).await;
                }
                Err(e) => {
                    self.events.publish(Event::CommandError(e.to_string()));
                }
            }
            result
        }
        .boxed()
    }

    fn execute<'a>(
        &'a self,
        command: &'a Command,
        history: &'a mut ExecutionHistory,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        async move {
            let outputs = self.outputs.as_ref();
            match command {
                Command::Type { text, delay } => {
                    input::type_text(&*self.input, &*self.capture, self.sandbox_ref(), &outputs.substitute(text), *delay).await
                }
                Command::PressKeys { keys } => {
                    input::press_keys(&*self.input, &*self.capture, self.sandbox_ref(), keys).await
                }
                Command::Click { x, y, action } => {
                    input::click(&*self.input, &*self.capture, self.sandbox_ref(), *x, *y, *action).await
                }
                Command::Hover { x, y } => {
                    input::click(
                        &*self.input,
                        &*self.capture,
                        self.sandbox_ref(),
                        *x,
                        *y,
                        crate::script::model::ClickAction::Hover,
                    )
                    .await
                }
                Command::Scroll { direction, amount, .. } => {
                    input::scroll(&*self.input, &*self.capture, self.sandbox_ref(), *direction, *amount).await
                }
                Command::HoverText { text, description, action, method } => {
                    vision::hover_text(
                        &self.reasoning,
                        &*self.capture,
                        &*self.input,
                        self.sandbox_ref(),
                        &outputs.substitute(text),
                        description.as_deref(),
                        *action,
                        *method,
                    )
                    .await
                }
                Command::HoverImage { description, action } => {
                    vision::hover_image(
                        &self.reasoning,
                        &*self.capture,
                        &*self.input,
                        self.sandbox_ref(),
                        &outputs.substitute(description),
                        *action,
                    )
                    .await
                }
                Command::MatchImage { path, action, invert } => {
                    let template = tokio::fs::read(path)
                        .await
                        .map_err(|e| RegistryError::InvalidPrimitive(format!("reading {path}: {e}")))?;
                    vision::match_image(&*self.capture, &*self.input, self.sandbox_ref(), &template, *action, *invert)
                        .await
                        .map(|_| ())
                }
                Command::Wait { timeout } => sync::wait(*timeout).await,
                Command::WaitForText { text, timeout, .. } => {
                    sync::wait_for_text(&self.reasoning, &*self.capture, &outputs.substitute(text), *timeout).await
                }
                Command::WaitForImage { description, timeout } => {
                    sync::wait_for_image(&self.reasoning, &*self.capture, &outputs.substitute(description), *timeout)
                        .await
                }
                Command::ScrollUntilText { text, direction, max_distance, method } => {
                    let text = outputs.substitute(text);
                    let reasoning = &self.reasoning;
                    let capture = &*self.capture;
                    sync::scroll_until(
                        &*self.input,
                        capture,
                        self.sandbox_ref(),
                        *direction,
                        *max_distance,
                        method.unwrap_or(crate::script::model::ScrollMethod::Mouse),
                        || async {
                            let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
                            let response = reasoning
                                .call(
                                    "assert/text",
                                    json!({"text": text, "image": base64_engine(&screenshot)}),
                                )
                                .await
                                .map_err(RegistryError::Reasoning)?;
                            Ok(response.get("result").and_then(serde_json::Value::as_bool).unwrap_or(false))
                        },
                    )
                    .await
                    .map(|_| ())
                }
                Command::ScrollUntilImage { description, direction, max_distance } => {
                    let description = outputs.substitute(description);
                    let reasoning = &self.reasoning;
                    let capture = &*self.capture;
                    sync::scroll_until(
                        &*self.input,
                        capture,
                        self.sandbox_ref(),
                        *direction,
                        *max_distance,
                        crate::script::model::ScrollMethod::Mouse,
                        || async {
                            let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
                            let response = reasoning
                                .call("locate", json!({"description": description, "image": base64_engine(&screenshot)}))
                                .await
                                .map_err(RegistryError::Reasoning)?;
                            Ok(response.get("x").is_some())
                        },
                    )
                    .await
                    .map(|_| ())
                }
                Command::Assert { expect, async_ } => {
                    semantic::assert(&self.reasoning, &*self.capture, &outputs.substitute(expect), *async_)
                        .await
                        .map(|_| ())
                }
                Command::Remember { description, value } => {
                    let confirmation = semantic::remember(
                        &self.reasoning,
                        &outputs.substitute(description),
                        &outputs.substitute(value),
                    )
                    .await?;
                    tracing::debug!(%confirmation, "remember acknowledged");
                    Ok(())
                }
                Command::FocusApplication { name } => semantic::focus_application(&outputs.substitute(name)).await,
                Command::Exec { language, mac, windows, linux, output, silent } => {
                    semantic::exec(
                        self.sandbox_ref(),
                        outputs,
                        *language,
                        mac.as_deref(),
                        windows.as_deref(),
                        linux.as_deref(),
                        output.as_deref(),
                        *silent,
                    )
                    .await
                    .map(|_| ())
                }
                Command::Run { file } => self.run_embedded_file(file, history).await,
                Command::If { condition, then_branch, else_branch } => {
                    let passed = semantic::assert(&self.reasoning, &*self.capture, &outputs.substitute(condition), false).await?;
                    let branch = if passed { then_branch } else { else_branch };
                    self.run_commands(branch, history).await
                }
            }
        }
        .boxed()
    }

    async fn run_embedded_file(&self, path: &str, history: &mut ExecutionHistory) -> Result<(), RegistryError> {
        use std::collections::HashMap;
        let script = ScriptStore::load(std::path::Path::new(path), &HashMap::new(), &HashMap::new())
            .map_err(|e| RegistryError::InvalidPrimitive(e.to_string()))?;
        for step in &script.steps {
            self.run_commands(&step.commands, history).await?;
        }
        Ok(())
    }

    async fn report_ran(&self, command: &Command, elapsed_ms: u64) {
        let data = json!({"command": command.kind(), "elapsedMs": elapsed_ms});
        self.analytics.track("command.ran", data.clone());
        // Best-effort: the reasoning service's `ran` endpoint is informational
        // context for later prompts, not something a failure should abort the
        // run over.
        let _ = self.reasoning.call("ran", data).await;
    }
}

fn base64_engine(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{NullAnalytics, NullInputDriver, NullScreenCapture};
    use crate::session::Session;
    use crate::script::model::ClickAction;

    fn commander() -> Commander {
        Commander {
            input: Arc::new(NullInputDriver),
            capture: Arc::new(NullScreenCapture),
            reasoning: Arc::new(ReasoningClient::new("http://127.0.0.1:0", None, Arc::new(Session::new()))),
            sandbox: None,
            outputs: Arc::new(Outputs::new()),
            events: Arc::new(EventBus::new()),
            analytics: Arc::new(NullAnalytics),
        }
    }

    #[tokio::test]
    async fn click_without_sandbox_records_history_on_success() {
        let commander = commander();
        let mut history = ExecutionHistory::new();
        history.push_step("click somewhere");
        let command = Command::Click { x: 1, y: 2, action: ClickAction::Click };
        commander.run_commands(std::slice::from_ref(&command), &mut history).await.unwrap();
        assert_eq!(history.entries()[0].commands.len(), 1);
    }

    #[tokio::test]
    async fn wait_substitutes_nothing_and_succeeds() {
        let commander = commander();
        let mut history = ExecutionHistory::new();
        history.push_step("wait a moment");
        let command = Command::Wait { timeout: 1 };
        commander.run_commands(std::slice::from_ref(&command), &mut history).await.unwrap();
        assert_eq!(history.entries()[0].commands.len(), 1);
    }
}
