//! Template matching for `match-image` (spec §4.5): sweeps thresholds
//! `{0.9, 0.8, 0.7}` and scale factors `{1, 0.5, 2, 0.75, 1.25, 1.5}`, picking
//! the first hit at the highest threshold achieved.

use image::{DynamicImage, GenericImageView};
use thiserror::Error;

const THRESHOLDS: [f32; 3] = [0.9, 0.8, 0.7];
const SCALES: [f32; 6] = [1.0, 0.5, 2.0, 0.75, 1.25, 1.5];

#[derive(Debug, Error)]
pub enum ImageMatchError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("template is larger than the search region")]
    TemplateTooLarge,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
    pub threshold: f32,
    pub scale: f32,
}

/// A rectangular region to restrict matching to (e.g. the active window's
/// bounds); `None` searches the whole haystack.
#[derive(Debug, Clone, Copy)]
pub struct SearchRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Searches `haystack_bytes` for `template_bytes`, sweeping thresholds from
/// highest to lowest and scales in the fixed order above; returns the first
/// hit found at the highest threshold that produces one at all. `invert`
/// flips the success predicate (a hit becomes a miss and vice versa) at the
/// call site, not here — callers translate `find` into the `invert`-aware
/// boolean the `match-image` primitive returns.
pub fn find(
    haystack_bytes: &[u8],
    template_bytes: &[u8],
    region: Option<SearchRegion>,
) -> Result<Option<MatchResult>, ImageMatchError> {
    let haystack = image::load_from_memory(haystack_bytes).map_err(|e| ImageMatchError::Decode(e.to_string()))?;
    let template = image::load_from_memory(template_bytes).map_err(|e| ImageMatchError::Decode(e.to_string()))?;

    let haystack_gray = crop_region(&haystack, region);

    for &threshold in &THRESHOLDS {
        for &scale in &SCALES {
            let scaled = scale_template(&template, scale);
            if scaled.width() > haystack_gray.width() || scaled.height() > haystack_gray.height() {
                continue;
            }
            if let Some((x, y, confidence)) = best_match(&haystack_gray, &scaled, threshold) {
                let (offset_x, offset_y) = region.map(|r| (r.x, r.y)).unwrap_or((0, 0));
                return Ok(Some(MatchResult {
                    x: x + offset_x,
                    y: y + offset_y,
                    width: scaled.width(),
                    height: scaled.height(),
                    confidence,
                    threshold,
                    scale,
                }));
            }
        }
    }
    Ok(None)
}

fn crop_region(image: &DynamicImage, region: Option<SearchRegion>) -> DynamicImage {
    match region {
        Some(r) => image.crop_imm(r.x, r.y, r.width, r.height),
        None => image.clone(),
    }
}

fn scale_template(template: &DynamicImage, scale: f32) -> DynamicImage {
    if (scale - 1.0).abs() < f32::EPSILON {
        return template.clone();
    }
    let new_w = ((template.width() as f32) * scale).round().max(1.0) as u32;
    let new_h = ((template.height() as f32) * scale).round().max(1.0) as u32;
    template.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
}

/// Slides `template` over `haystack`, scoring each position by normalized
/// mean absolute difference of grayscale luma; returns the best position
/// that meets `threshold`, or `None`.
fn best_match(haystack: &DynamicImage, template: &DynamicImage, threshold: f32) -> Option<(u32, u32, f32)> {
    let hay = haystack.to_luma8();
    let tmpl = template.to_luma8();
    let (hw, hh) = hay.dimensions();
    let (tw, th) = tmpl.dimensions();
    if tw > hw || th > hh {
        return None;
    }

    let mut best: Option<(u32, u32, f32)> = None;
    let step = ((tw.min(th)) / 4).max(1);
    let mut y = 0;
    while y + th <= hh {
        let mut x = 0;
        while x + tw <= hw {
            let mut diff_sum: u64 = 0;
            for ty in 0..th {
                for tx in 0..tw {
                    let h_px = hay.get_pixel(x + tx, y + ty)[0] as i32;
                    let t_px = tmpl.get_pixel(tx, ty)[0] as i32;
                    diff_sum += (h_px - t_px).unsigned_abs() as u64;
                }
            }
            let max_diff = 255u64 * (tw as u64) * (th as u64);
            let confidence = 1.0 - (diff_sum as f32 / max_diff.max(1) as f32);
            if confidence >= threshold && best.map(|(_, _, c)| confidence > c).unwrap_or(true) {
                best = Some((x, y, confidence));
            }
            x += step;
        }
        y += step;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn png_bytes(buf: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        let dynamic = DynamicImage::ImageLuma8(buf.clone());
        dynamic.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn finds_exact_template_in_haystack() {
        let mut haystack = ImageBuffer::from_pixel(20, 20, Luma([0u8]));
        for y in 5..10 {
            for x in 5..10 {
                haystack.put_pixel(x, y, Luma([255]));
            }
        }
        let template = ImageBuffer::from_pixel(5, 5, Luma([255u8]));

        let result = find(&png_bytes(&haystack), &png_bytes(&template), None).unwrap();
        let hit = result.expect("expected a match");
        assert_eq!(hit.x, 5);
        assert_eq!(hit.y, 5);
        assert!(hit.confidence >= 0.9);
    }

    #[test]
    fn no_match_for_unrelated_template() {
        let haystack = ImageBuffer::from_pixel(20, 20, Luma([0u8]));
        let template = ImageBuffer::from_pixel(5, 5, Luma([255u8]));
        let result = find(&png_bytes(&haystack), &png_bytes(&template), None).unwrap();
        assert!(result.is_none());
    }
}
