// src/engine/trim.rs
//
// Border removal: crop away the margin that matches the top-left pixel.

use crate::engine::crop::extract_area;
use crate::engine::image::Image;
use crate::engine::region::{Rect, Region};
use crate::error::{ImageOpsError, Result};
use tracing::debug;

/// Bounding box of every pixel differing from `reference` by more than
/// `tolerance` in some band. `None` when the whole region is background.
fn foreground_box(region: &Region, reference: &[f32], tolerance: f32) -> Option<Rect> {
    let rect = region.rect();
    let is_foreground = |x: u32, y: u32| {
        region
            .pixel(x, y)
            .iter()
            .zip(reference)
            .any(|(&v, &r)| (v - r).abs() > tolerance)
    };
    let row_has_foreground = |y: u32| (rect.x..rect.right()).any(|x| is_foreground(x, y));

    let top = (rect.y..rect.bottom()).find(|&y| row_has_foreground(y))?;
    let bottom = (top..rect.bottom()).rev().find(|&y| row_has_foreground(y))?;
    let column_has_foreground = |x: u32| (top..=bottom).any(|y| is_foreground(x, y));
    let left = (rect.x..rect.right()).find(|&x| column_has_foreground(x))?;
    let right = (left..rect.right()).rev().find(|&x| column_has_foreground(x))?;

    Some(Rect::new(left, top, right - left + 1, bottom - top + 1))
}

/// Remove borders that match pixel `(0, 0)` within `tolerance` (sample units).
///
/// A flat image, or one whose content already touches every edge, is returned
/// unchanged.
pub fn trim(image: &Image, tolerance: f64) -> Result<Image> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ImageOpsError::invalid_argument(
            "tolerance",
            tolerance.to_string(),
            "must be a non-negative finite number",
        ));
    }
    let pixels = image.materialize()?;
    let reference = pixels.pixel(0, 0).to_vec();

    let Some(content) = foreground_box(&pixels, &reference, tolerance as f32) else {
        debug!(target: "lazy_image_ops::trim", "image is uniform, nothing to trim");
        return Ok(image.clone());
    };
    if content == image.bounds() {
        return Ok(image.clone());
    }
    debug!(
        target: "lazy_image_ops::trim",
        left = content.x,
        top = content.y,
        width = content.width,
        height = content.height,
        "trimmed"
    );
    extract_area(image, content.x, content.y, content.width, content.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::image::SampleFormat;

    fn framed(width: u32, height: u32, inner: Rect) -> Image {
        Image::from_fn(width, height, 3, SampleFormat::U8, |x, y, b| {
            let inside = x >= inner.x && x < inner.right() && y >= inner.y && y < inner.bottom();
            if inside {
                [200.0, 30.0, 60.0][b]
            } else {
                [250.0, 250.0, 250.0][b]
            }
        })
        .unwrap()
    }

    #[test]
    fn test_flat_image_is_noop() {
        let img = Image::filled(5, 5, SampleFormat::U8, &[7.0, 7.0, 7.0]).unwrap();
        assert!(trim(&img, 0.0).unwrap().is_same(&img));
    }

    #[test]
    fn test_trims_uniform_border() {
        let img = framed(10, 8, Rect::new(3, 2, 4, 3));
        let out = trim(&img, 10.0).unwrap();
        assert_eq!((out.width(), out.height()), (4, 3));
        let pixels = out.materialize().unwrap();
        assert!(pixels.pixels().all(|p| p == [200.0, 30.0, 60.0]));
    }

    #[test]
    fn test_tolerance_absorbs_small_differences() {
        let img = Image::from_fn(6, 6, 1, SampleFormat::U8, |x, y, _| {
            if (2..4).contains(&x) && (2..4).contains(&y) {
                100.0
            } else if x == 0 {
                52.0
            } else {
                50.0
            }
        })
        .unwrap();
        let loose = trim(&img, 5.0).unwrap();
        assert_eq!((loose.width(), loose.height()), (2, 2));
        let strict = trim(&img, 0.0).unwrap();
        assert_eq!((strict.width(), strict.height()), (5, 6));
    }

    #[test]
    fn test_content_spanning_image_is_noop() {
        let img = Image::from_fn(4, 4, 1, SampleFormat::U8, |x, y, _| {
            if (x, y) == (3, 0) || (x, y) == (0, 3) {
                1.0
            } else {
                0.0
            }
        })
        .unwrap();
        assert!(trim(&img, 0.0).unwrap().is_same(&img));
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        let img = Image::filled(2, 2, SampleFormat::U8, &[0.0]).unwrap();
        assert!(trim(&img, -1.0).is_err());
        assert!(trim(&img, f64::NAN).is_err());
    }
}
