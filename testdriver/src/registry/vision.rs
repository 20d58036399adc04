//! Vision primitives (spec §4.5): `hover-text`, `hover-image`, `match-image`.

use base64::Engine;
use serde_json::json;

use crate::image_match;
use crate::ports::{InputDriver, ScreenCapture};
use crate::reasoning::ReasoningClient;
use crate::sandbox::SandboxTransport;
use crate::script::model::{ClickAction, TextMatchMethod};

use super::input::click;
use super::RegistryError;

fn encode_png(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn method_name(method: TextMatchMethod) -> &'static str {
    match method {
        TextMatchMethod::Turbo => "turbo",
        TextMatchMethod::Leven => "leven",
        TextMatchMethod::Dice => "dice",
    }
}

/// Calls the reasoning service's text-locate endpoint with a base64
/// screenshot; on success, clicks (or hovers) the returned coordinates.
pub async fn hover_text(
    reasoning: &ReasoningClient,
    capture: &dyn ScreenCapture,
    input: &dyn InputDriver,
    sandbox: Option<&SandboxTransport>,
    text: &str,
    description: Option<&str>,
    action: ClickAction,
    method: TextMatchMethod,
) -> Result<(), RegistryError> {
    let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
    let response = reasoning
        .call(
            "hover/text",
            json!({
                "text": text,
                "description": description,
                "method": method_name(method),
                "image": encode_png(&screenshot),
            }),
        )
        .await
        .map_err(RegistryError::Reasoning)?;
    let (x, y) = coordinates_from(&response)?;
    click(input, capture, sandbox, x, y, action).await
}

/// As [`hover_text`] but against the image-locate endpoint.
pub async fn hover_image(
    reasoning: &ReasoningClient,
    capture: &dyn ScreenCapture,
    input: &dyn InputDriver,
    sandbox: Option<&SandboxTransport>,
    description: &str,
    action: ClickAction,
) -> Result<(), RegistryError> {
    let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
    let response = reasoning
        .call("hover/image", json!({"description": description, "image": encode_png(&screenshot)}))
        .await
        .map_err(RegistryError::Reasoning)?;
    let (x, y) = coordinates_from(&response)?;
    click(input, capture, sandbox, x, y, action).await
}

fn coordinates_from(response: &serde_json::Value) -> Result<(i32, i32), RegistryError> {
    let x = response.get("x").and_then(serde_json::Value::as_i64);
    let y = response.get("y").and_then(serde_json::Value::as_i64);
    match (x, y) {
        (Some(x), Some(y)) => Ok((x as i32, y as i32)),
        _ => Err(RegistryError::InvalidPrimitive("locate response missing x/y".to_string())),
    }
}

/// Local template match over the current screenshot (spec §4.5): sweeps
/// thresholds and scales via [`image_match::find`]; `invert` flips the
/// success predicate.
pub async fn match_image(
    capture: &dyn ScreenCapture,
    input: &dyn InputDriver,
    sandbox: Option<&SandboxTransport>,
    template_bytes: &[u8],
    action: ClickAction,
    invert: bool,
) -> Result<bool, RegistryError> {
    let screenshot = capture.capture_primary().await.map_err(RegistryError::Port)?;
    let found = image_match::find(&screenshot, template_bytes, None)
        .map_err(|e| RegistryError::InvalidPrimitive(e.to_string()))?;

    let success = found.is_some() != invert;
    if let Some(hit) = found {
        if !invert {
            let center_x = (hit.x + hit.width / 2) as i32;
            let center_y = (hit.y + hit.height / 2) as i32;
            click(input, capture, sandbox, center_x, center_y, action).await?;
        }
    }
    Ok(success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_from_extracts_x_and_y() {
        let response = json!({"x": 12, "y": 34});
        assert_eq!(coordinates_from(&response).unwrap(), (12, 34));
    }

    #[test]
    fn coordinates_from_errors_without_x_or_y() {
        let response = json!({"other": true});
        assert!(coordinates_from(&response).is_err());
    }

    #[test]
    fn method_name_matches_spec_tokens() {
        assert_eq!(method_name(TextMatchMethod::Turbo), "turbo");
        assert_eq!(method_name(TextMatchMethod::Leven), "leven");
        assert_eq!(method_name(TextMatchMethod::Dice), "dice");
    }
}
