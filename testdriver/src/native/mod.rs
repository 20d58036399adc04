//! Native OS input/screen-capture drivers, built only under the `native`
//! feature (spec §1: OS input primitives and screenshot capture are
//! out-of-scope external collaborators consumed through [`crate::ports`]).
//!
//! Grounded in `ioi-foundation`'s `operator.rs` `NativeOperator` (enigo-backed
//! input) and its `vision.rs` `NativeVision::capture_primary` (xcap-backed
//! capture).

use async_trait::async_trait;
use enigo::{Button, Coordinate, Enigo, Keyboard, Mouse, Settings};
use std::sync::Mutex;

use crate::ports::{InputDriver, MouseButton, PortError};
use crate::ports::ScreenCapture;

/// `enigo`-backed [`InputDriver`]. `enigo::Enigo` is not `Sync`, so access is
/// serialized behind a mutex; primitives never run concurrently anyway
/// (spec §5 "no primitive may execute concurrently with another").
pub struct NativeInputDriver {
    enigo: Mutex<Enigo>,
}

impl NativeInputDriver {
    pub fn new() -> Result<Self, PortError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| PortError::Input(e.to_string()))?;
        Ok(Self { enigo: Mutex::new(enigo) })
    }
}

#[async_trait]
impl InputDriver for NativeInputDriver {
    async fn move_mouse(&self, x: i32, y: i32) -> Result<(), PortError> {
        self.enigo
            .lock()
            .unwrap()
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| PortError::Input(e.to_string()))
    }

    async fn click(&self, button: MouseButton) -> Result<(), PortError> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        };
        self.enigo
            .lock()
            .unwrap()
            .button(button, enigo::Direction::Click)
            .map_err(|e| PortError::Input(e.to_string()))
    }

    async fn type_text(&self, text: &str, delay_ms: u64) -> Result<(), PortError> {
        let mut enigo = self.enigo.lock().unwrap();
        if delay_ms == 0 {
            return enigo.text(text).map_err(|e| PortError::Input(e.to_string()));
        }
        // Works around a known duplicated-character issue on native drivers
        // (spec §4.5) by typing one key at a time with an inter-key delay.
        for ch in text.chars() {
            enigo.text(&ch.to_string()).map_err(|e| PortError::Input(e.to_string()))?;
            std::thread::sleep(std::time::Duration::from_millis(delay_ms));
        }
        Ok(())
    }

    async fn key_tap(&self, key: &str) -> Result<(), PortError> {
        let key = key_from_name(key);
        self.enigo
            .lock()
            .unwrap()
            .key(key, enigo::Direction::Click)
            .map_err(|e| PortError::Input(e.to_string()))
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), PortError> {
        let mut enigo = self.enigo.lock().unwrap();
        if dx != 0 {
            enigo.scroll(dx, enigo::Axis::Horizontal).map_err(|e| PortError::Input(e.to_string()))?;
        }
        if dy != 0 {
            enigo.scroll(dy, enigo::Axis::Vertical).map_err(|e| PortError::Input(e.to_string()))?;
        }
        Ok(())
    }
}

fn key_from_name(name: &str) -> enigo::Key {
    match name.to_lowercase().as_str() {
        "enter" | "return" => enigo::Key::Return,
        "tab" => enigo::Key::Tab,
        "escape" | "esc" => enigo::Key::Escape,
        "space" => enigo::Key::Space,
        "backspace" => enigo::Key::Backspace,
        "delete" => enigo::Key::Delete,
        "up" => enigo::Key::UpArrow,
        "down" => enigo::Key::DownArrow,
        "left" => enigo::Key::LeftArrow,
        "right" => enigo::Key::RightArrow,
        other => enigo::Key::Unicode(other.chars().next().unwrap_or(' ')),
    }
}

/// `xcap`-backed [`ScreenCapture`]: the primary monitor encoded as PNG.
pub struct NativeScreenCapture;

#[async_trait]
impl ScreenCapture for NativeScreenCapture {
    async fn capture_primary(&self) -> Result<Vec<u8>, PortError> {
        tokio::task::spawn_blocking(|| {
            let monitors = xcap::Monitor::all().map_err(|e| PortError::Capture(e.to_string()))?;
            let primary = monitors
                .into_iter()
                .find(|m| m.is_primary().unwrap_or(false))
                .ok_or_else(|| PortError::Capture("no primary monitor found".to_string()))?;
            let image = primary.capture_image().map_err(|e| PortError::Capture(e.to_string()))?;
            let mut bytes = Vec::new();
            image::DynamicImage::ImageRgba8(image)
                .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(|e| PortError::Capture(e.to_string()))?;
            Ok(bytes)
        })
        .await
        .map_err(|e| PortError::Capture(e.to_string()))?
    }
}
