//! Synchronization primitives (spec §4.5): `wait`, `wait-for-text`,
//! `wait-for-image`, `scroll-until-text`, `scroll-until-image`.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::ports::{InputDriver, ScreenCapture};
use crate::reasoning::ReasoningClient;
use crate::sandbox::SandboxTransport;
use crate::script::model::{ScrollDirection, ScrollMethod};

use super::input::scroll;
use super::RegistryError;

const POLL_INTERVAL: Duration = Duration::from_millis(2500);
const KEYBOARD_SCROLL_INCREMENT: i32 = 300;
const MOUSE_SCROLL_INCREMENT: i32 = 200;

pub async fn wait(timeout_ms: u64) -> Result<(), RegistryError> {
    tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
    Ok(())
}

/// Polls at 2.5s cadence, re-capturing the screen each time, asking the
/// reasoning service's `assert/text` endpoint whether `text` is present.
pub async fn wait_for_text(
    reasoning: &ReasoningClient,
    capture: &dyn ScreenCapture,
    text: &str,
    timeout_ms: u64,
) -> Result<(), RegistryError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
        let response = reasoning
            .call("assert/text", json!({"text": text, "image": base64_encode(&screenshot)}))
            .await
            .map_err(RegistryError::Reasoning)?;
        if response.get("result").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RegistryError::Timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_image(
    reasoning: &ReasoningClient,
    capture: &dyn ScreenCapture,
    description: &str,
    timeout_ms: u64,
) -> Result<(), RegistryError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
        let response = reasoning
            .call("locate", json!({"description": description, "image": base64_encode(&screenshot)}))
            .await
            .map_err(RegistryError::Reasoning)?;
        if response.get("x").is_some() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RegistryError::Timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Scrolls by a fixed increment until `predicate` holds or `max_distance`
/// pixels have been traversed (spec §4.5). For text targets, the caller may
/// trigger a native find-in-page shortcut beforehand; for image targets
/// that branch is omitted entirely (spec §9 Open Question: "nonsensical for
/// images").
pub async fn scroll_until<F, Fut>(
    input: &dyn InputDriver,
    capture: &dyn ScreenCapture,
    sandbox: Option<&SandboxTransport>,
    direction: ScrollDirection,
    max_distance: i32,
    method: ScrollMethod,
    mut predicate: F,
) -> Result<i32, RegistryError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, RegistryError>>,
{
    let increment = match method {
        ScrollMethod::Keyboard => KEYBOARD_SCROLL_INCREMENT,
        ScrollMethod::Mouse => MOUSE_SCROLL_INCREMENT,
    };
    let mut traveled = 0;
    loop {
        if predicate().await? {
            return Ok(traveled);
        }
        if traveled >= max_distance {
            return Err(RegistryError::Timeout);
        }
        scroll(input, capture, sandbox, direction, increment).await?;
        traveled += increment;
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{NullInputDriver, NullScreenCapture};

    #[tokio::test]
    async fn wait_sleeps_for_the_given_duration() {
        let start = Instant::now();
        wait(10).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn scroll_until_stops_when_predicate_holds() {
        let driver = NullInputDriver;
        let capture = NullScreenCapture;
        let mut calls = 0;
        let distance = scroll_until(&driver, &capture, None, ScrollDirection::Down, 10_000, ScrollMethod::Mouse, || {
            calls += 1;
            let hit = calls >= 3;
            async move { Ok(hit) }
        })
        .await
        .unwrap();
        assert_eq!(distance, 2 * MOUSE_SCROLL_INCREMENT);
    }

    #[tokio::test]
    async fn scroll_until_times_out_past_max_distance() {
        let driver = NullInputDriver;
        let capture = NullScreenCapture;
        let result = scroll_until(&driver, &capture, None, ScrollDirection::Down, 100, ScrollMethod::Mouse, || async {
            Ok(false)
        })
        .await;
        assert!(matches!(result, Err(RegistryError::Timeout)));
    }
}
