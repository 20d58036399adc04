//! Semantic primitives (spec §4.5): `assert`, `remember`, `focus-application`,
//! `exec`.

use std::process::Stdio;

use base64::Engine;
use serde_json::json;

use crate::outputs::Outputs;
use crate::ports::ScreenCapture;
use crate::reasoning::ReasoningClient;
use crate::sandbox::SandboxTransport;
use crate::script::model::ExecLanguage;

use super::RegistryError;

const PASS_TOKEN: &str = "The task passed";

/// Captures the screen, asks the reasoning service, and treats a response
/// containing [`PASS_TOKEN`] as success. `async_` makes a failure surface
/// immediately as an error rather than a returned `false`.
pub async fn assert(
    reasoning: &ReasoningClient,
    capture: &dyn ScreenCapture,
    expect: &str,
    async_: bool,
) -> Result<bool, RegistryError> {
    let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
    let response = reasoning
        .call(
            "assert",
            json!({
                "expect": expect,
                "image": base64::engine::general_purpose::STANDARD.encode(&screenshot),
            }),
        )
        .await
        .map_err(RegistryError::Reasoning)?;
    let markdown = response.get("markdown").and_then(serde_json::Value::as_str).unwrap_or("");
    let passed = markdown.contains(PASS_TOKEN);
    if !passed && async_ {
        return Err(RegistryError::AssertionFailed(expect.to_string()));
    }
    Ok(passed)
}

/// Posts to the reasoning service for server-side memory; returns the
/// confirmation string (to avoid re-invocation loops, per spec §4.5).
pub async fn remember(
    reasoning: &ReasoningClient,
    description: &str,
    value: &str,
) -> Result<String, RegistryError> {
    let response = reasoning
        .call("remember", json!({"description": description, "value": value}))
        .await
        .map_err(RegistryError::Reasoning)?;
    Ok(response
        .get("confirmation")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("remembered")
        .to_string())
}

/// Platform-specific window focus (spec §4.5): mac via `osascript`,
/// windows via PowerShell, linux via `wmctrl`.
pub async fn focus_application(name: &str) -> Result<(), RegistryError> {
    let (program, args): (&str, Vec<String>) = if cfg!(target_os = "macos") {
        (
            "osascript",
            vec!["-e".to_string(), format!("tell application \"{name}\" to activate")],
        )
    } else if cfg!(target_os = "windows") {
        (
            "powershell",
            vec![
                "-Command".to_string(),
                format!(
                    "(New-Object -ComObject WScript.Shell).AppActivate('{name}')"
                ),
            ],
        )
    } else {
        ("wmctrl", vec!["-a".to_string(), name.to_string()])
    };

    let status = tokio::process::Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| RegistryError::Exec(e.to_string()))?;
    if !status.success() {
        return Err(RegistryError::Exec(format!("{program} exited with {status}")));
    }
    Ok(())
}

/// Selects code by host OS, runs it, and optionally stores the result in
/// [`Outputs`] under `output`. `shell` runs via the host's child-process
/// facility (or the sandbox, when `sandbox` is `Some`); `js` evaluates in
/// the embedded JS context (spec §4.5, §9).
pub async fn exec(
    sandbox: Option<&SandboxTransport>,
    outputs: &Outputs,
    language: ExecLanguage,
    mac: Option<&str>,
    windows: Option<&str>,
    linux: Option<&str>,
    output: Option<&str>,
    silent: bool,
) -> Result<String, RegistryError> {
    let code = if cfg!(target_os = "macos") {
        mac
    } else if cfg!(target_os = "windows") {
        windows
    } else {
        linux
    }
    .ok_or_else(|| RegistryError::Exec("no code provided for this host OS".to_string()))?;

    let result = match language {
        ExecLanguage::Js => crate::js_exec::eval(code).map_err(|e| RegistryError::Exec(e.to_string()))?,
        ExecLanguage::Shell => run_shell(sandbox, code).await?,
    };

    if !silent {
        tracing::info!(%result, "exec completed");
    }
    if let Some(name) = output {
        outputs.set(name, result.clone());
    }
    Ok(result)
}

async fn run_shell(sandbox: Option<&SandboxTransport>, code: &str) -> Result<String, RegistryError> {
    if let Some(sandbox) = sandbox {
        let response = sandbox
            .request("exec", json!({"command": code}), std::time::Duration::from_secs(60))
            .await
            .map_err(RegistryError::Sandbox)?;
        return Ok(response.as_str().unwrap_or_default().to_string());
    }

    let shell = if cfg!(target_os = "windows") { "powershell" } else { "sh" };
    let flag = if cfg!(target_os = "windows") { "-Command" } else { "-c" };
    let output = tokio::process::Command::new(shell)
        .arg(flag)
        .arg(code)
        .output()
        .await
        .map_err(|e| RegistryError::Exec(e.to_string()))?;
    if !output.status.success() {
        return Err(RegistryError::Exec(format!(
            "exit {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_token_matches_spec_wording() {
        assert_eq!(PASS_TOKEN, "The task passed");
    }
}
