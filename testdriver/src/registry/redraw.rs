//! Redraw barrier (spec §4.5, §9): the single synchronization primitive
//! between UI actuation and subsequent decisions. `start()` records a
//! baseline; `wait()` resolves once a pixel diff exceeds 5% AND network
//! activity has been quiescent for >=2s, or the timeout elapses.

use std::time::{Duration, Instant};

use image::GenericImageView;

use crate::ports::ScreenCapture;
use crate::sandbox::SandboxTransport;

/// Fraction of pixels that differ between two same-sized images, `0.0..=1.0`.
/// Images that fail to decode or whose dimensions differ (e.g. the null
/// capture's empty buffer) are treated as maximally different so the
/// barrier never stalls waiting on them.
pub fn pixel_diff_ratio(before: &[u8], after: &[u8]) -> f64 {
    let (Ok(before_img), Ok(after_img)) = (image::load_from_memory(before), image::load_from_memory(after)) else {
        return 1.0;
    };
    let dims = before_img.dimensions();
    if dims != after_img.dimensions() || dims.0 == 0 || dims.1 == 0 {
        return 1.0;
    }
    let total = dims.0 as u64 * dims.1 as u64;
    let diff = before_img.pixels().zip(after_img.pixels()).filter(|(a, b)| a.2 != b.2).count() as u64;
    diff as f64 / total as f64
}

/// Heuristic redraw/network-quiescence barrier.
///
/// `network_activity` is fed by the caller (e.g. the sandbox transport)
/// whenever bytes move on the wire; [`RedrawBarrier::wait`] treats the
/// absence of activity for the quiescence window as "network settled."
pub struct RedrawBarrier {
    quiescence_window: Duration,
    pixel_diff_threshold: f64,
}

impl Default for RedrawBarrier {
    fn default() -> Self {
        Self { quiescence_window: Duration::from_secs(2), pixel_diff_threshold: 0.05 }
    }
}

impl RedrawBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call before a mutating primitive acts; returns a baseline screenshot
    /// handle the caller retains for the subsequent [`RedrawBarrier::wait`] call.
    pub fn start(&self, before_screenshot: Vec<u8>) -> RedrawWatch {
        RedrawWatch { before: before_screenshot, started_at: Instant::now() }
    }

    /// Waits until either the pixel-diff + quiescence condition holds or
    /// `timeout` elapses. `pixel_diff_ratio` and `last_network_activity` are
    /// supplied by the caller (the registry polls the screen and the
    /// transport's last-send/receive timestamp).
    pub async fn wait(
        &self,
        watch: &RedrawWatch,
        timeout: Duration,
        mut sample: impl FnMut() -> (f64, Instant),
    ) -> bool {
        let deadline = watch.started_at + timeout;
        loop {
            let (pixel_diff_ratio, last_activity) = sample();
            let quiescent = last_activity.elapsed() >= self.quiescence_window;
            if pixel_diff_ratio > self.pixel_diff_threshold && quiescent {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// The polling loop every mutating primitive runs: capture-based pixel
    /// diff against `watch.before`, network quiescence from `sandbox`'s
    /// last activity when one is attached (always quiescent otherwise).
    /// Resolves once both conditions hold or `timeout` elapses. Unlike
    /// [`RedrawBarrier::wait`], sampling here is itself async (capturing a
    /// real screenshot), so the loop is written out rather than routed
    /// through `wait`'s synchronous `sample` closure.
    pub async fn settle(
        &self,
        watch: &RedrawWatch,
        capture: &dyn ScreenCapture,
        sandbox: Option<&SandboxTransport>,
        timeout: Duration,
    ) -> bool {
        let deadline = watch.started_at + timeout;
        loop {
            let after = capture.capture_primary().await.unwrap_or_default();
            let ratio = pixel_diff_ratio(&watch.before, &after);
            let quiescent = sandbox
                .map(|s| s.last_activity().elapsed() >= self.quiescence_window)
                .unwrap_or(true);
            if ratio > self.pixel_diff_threshold && quiescent {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Baseline captured by [`RedrawBarrier::start`].
pub struct RedrawWatch {
    pub before: Vec<u8>,
    pub started_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_immediately_when_settled() {
        let barrier = RedrawBarrier::new();
        let watch = barrier.start(Vec::new());
        let settled_at = Instant::now() - Duration::from_secs(3);
        let resolved = barrier
            .wait(&watch, Duration::from_millis(200), || (0.1, settled_at))
            .await;
        assert!(resolved);
    }

    #[tokio::test]
    async fn wait_times_out_when_never_settled() {
        let barrier = RedrawBarrier::new();
        let watch = barrier.start(Vec::new());
        let resolved = barrier
            .wait(&watch, Duration::from_millis(100), || (0.0, Instant::now()))
            .await;
        assert!(!resolved);
    }

    fn png(pixel: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb(pixel));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn pixel_diff_ratio_is_zero_for_identical_images() {
        let a = png([10, 20, 30]);
        assert_eq!(pixel_diff_ratio(&a, &a), 0.0);
    }

    #[test]
    fn pixel_diff_ratio_is_one_for_fully_different_images() {
        let a = png([10, 20, 30]);
        let b = png([200, 200, 200]);
        assert_eq!(pixel_diff_ratio(&a, &b), 1.0);
    }

    #[test]
    fn pixel_diff_ratio_treats_undecodable_input_as_fully_different() {
        assert_eq!(pixel_diff_ratio(&[], &[]), 1.0);
    }

    #[tokio::test]
    async fn settle_resolves_once_capture_diverges_from_baseline() {
        struct DivergingCapture;
        #[async_trait::async_trait]
        impl ScreenCapture for DivergingCapture {
            async fn capture_primary(&self) -> Result<Vec<u8>, crate::ports::PortError> {
                Ok(png([200, 200, 200]))
            }
        }

        let barrier = RedrawBarrier::new();
        let watch = barrier.start(png([10, 20, 30]));
        let resolved = barrier
            .settle(&watch, &DivergingCapture, None, Duration::from_millis(200))
            .await;
        assert!(resolved);
    }
}
