// src/engine/crop.rs
//
// Crop window search and region extraction.
//
// `crop` slides a target-sized window over the image on a coarse candidate
// grid, scores every window with a CropStrategy and returns the best offset.
// Scoring runs on the global pool when parallel rendering is enabled; scores
// are collected in scan order, so the tie-break is the same either way.

use crate::engine::config::{config, EngineConfig};
use crate::engine::image::{Image, ImageHeader};
use crate::engine::pool::get_pool;
use crate::engine::region::{Rect, Region};
use crate::engine::tone::luminance;
use crate::error::{ImageOpsError, Result};
use crate::ops::Operation;
use rayon::prelude::*;
use std::str::FromStr;
use tracing::debug;

/// Scores a candidate window; higher means more interesting.
pub trait CropStrategy: Send + Sync {
    /// `header` describes the image the window was cut from.
    fn score(&self, window: &Region, header: &ImageHeader) -> f64;
}

impl<F> CropStrategy for F
where
    F: Fn(&Region) -> f64 + Send + Sync,
{
    fn score(&self, window: &Region, _header: &ImageHeader) -> f64 {
        self(window)
    }
}

/// Shannon entropy of the luminance histogram.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntropyStrategy;

impl CropStrategy for EntropyStrategy {
    fn score(&self, window: &Region, header: &ImageHeader) -> f64 {
        let colour = header.colour_bands();
        let to_bin = 255.0 / header.format.max_value();
        let mut histogram = [0u64; 256];
        for px in window.pixels() {
            let bin = (luminance(px, colour) * to_bin).round().clamp(0.0, 255.0) as usize;
            histogram[bin] += 1;
        }
        let total = window.rect().area() as f64;
        histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total;
                -p * p.log2()
            })
            .sum()
    }
}

/// Saliency: luminance edges, skin tones and saturated colour in CIE Lab.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttentionStrategy;

const SKIN_A: std::ops::RangeInclusive<f32> = 3.0..=22.0;
const SKIN_B: std::ops::RangeInclusive<f32> = 4.0..=31.0;
const SATURATED_CHROMA: f32 = 60.0;
const FEATURE_WEIGHT: f64 = 255.0;

#[derive(Clone, Copy)]
struct Lab {
    l: f32,
    a: f32,
    b: f32,
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// sRGB in `[0, 1]` to Lab under D65.
fn to_lab(rgb: [f32; 3]) -> Lab {
    let [r, g, b] = rgb.map(srgb_to_linear);
    let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / 0.950_47;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = (0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b) / 1.088_83;
    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

impl AttentionStrategy {
    fn lab_plane(window: &Region, header: &ImageHeader) -> Vec<Lab> {
        let max = header.format.max_value();
        let colour = header.colour_bands() as usize;
        let alpha = header.alpha_band();
        window
            .pixels()
            .map(|px| {
                let mut rgb = if colour >= 3 {
                    [px[0], px[1], px[2]]
                } else {
                    [px[0]; 3]
                }
                .map(|v| (v / max).clamp(0.0, 1.0));
                if let Some(i) = alpha {
                    let a = (px[i] / max).clamp(0.0, 1.0);
                    rgb = rgb.map(|c| c * a + 0.5 * (1.0 - a));
                }
                to_lab(rgb)
            })
            .collect()
    }
}

impl CropStrategy for AttentionStrategy {
    fn score(&self, window: &Region, header: &ImageHeader) -> f64 {
        let rect = window.rect();
        let (w, h) = (rect.width as i64, rect.height as i64);
        let lab = Self::lab_plane(window, header);
        let l_at = |x: i64, y: i64| -> f32 {
            let x = x.clamp(0, w - 1);
            let y = y.clamp(0, h - 1);
            lab[(y * w + x) as usize].l
        };

        let mut total = 0.0f64;
        for y in 0..h {
            for x in 0..w {
                let gx = (l_at(x + 1, y - 1) + 2.0 * l_at(x + 1, y) + l_at(x + 1, y + 1))
                    - (l_at(x - 1, y - 1) + 2.0 * l_at(x - 1, y) + l_at(x - 1, y + 1));
                let gy = (l_at(x - 1, y + 1) + 2.0 * l_at(x, y + 1) + l_at(x + 1, y + 1))
                    - (l_at(x - 1, y - 1) + 2.0 * l_at(x, y - 1) + l_at(x + 1, y - 1));
                total += (gx.abs() + gy.abs()) as f64;

                let Lab { a, b, .. } = lab[(y * w + x) as usize];
                if SKIN_A.contains(&a) && SKIN_B.contains(&b) {
                    total += FEATURE_WEIGHT;
                }
                if a.hypot(b) > SATURATED_CHROMA {
                    total += FEATURE_WEIGHT;
                }
            }
        }
        total
    }
}

/// Built-in strategies by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Entropy,
    Attention,
}

impl CropStrategy for Strategy {
    fn score(&self, window: &Region, header: &ImageHeader) -> f64 {
        match self {
            Strategy::Entropy => EntropyStrategy.score(window, header),
            Strategy::Attention => AttentionStrategy.score(window, header),
        }
    }
}

impl FromStr for Strategy {
    type Err = ImageOpsError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "entropy" => Ok(Strategy::Entropy),
            "attention" => Ok(Strategy::Attention),
            _ => Err(ImageOpsError::invalid_argument(
                "strategy",
                name.to_string(),
                "expected entropy or attention",
            )),
        }
    }
}

/// Offsets `0, step, 2*step, ...` up to and always including `range`.
fn candidate_offsets(range: u32, per_axis: u32) -> Vec<u32> {
    if range == 0 {
        return vec![0];
    }
    let step = range.div_ceil(per_axis.max(1)).max(1);
    let mut offsets: Vec<u32> = (0..=range).step_by(step as usize).collect();
    if offsets.last() != Some(&range) {
        offsets.push(range);
    }
    offsets
}

fn check_target(image: &Image, width: u32, height: u32) -> Result<()> {
    for (name, value, limit) in [("width", width, image.width()), ("height", height, image.height())] {
        if value == 0 || value > limit {
            return Err(ImageOpsError::invalid_argument(
                name,
                value.to_string(),
                format!("must be between 1 and {limit}"),
            ));
        }
    }
    Ok(())
}

/// Top-left offset of the most interesting `width x height` window.
pub fn crop(image: &Image, width: u32, height: u32, strategy: &dyn CropStrategy) -> Result<(u32, u32)> {
    crop_with(image, width, height, strategy, config())
}

pub fn crop_with(
    image: &Image,
    width: u32,
    height: u32,
    strategy: &dyn CropStrategy,
    config: &EngineConfig,
) -> Result<(u32, u32)> {
    check_target(image, width, height)?;
    config.validate()?;
    if width == image.width() && height == image.height() {
        return Ok((0, 0));
    }

    let xs = candidate_offsets(image.width() - width, config.crop_candidates);
    let ys = candidate_offsets(image.height() - height, config.crop_candidates);
    let candidates: Vec<(u32, u32)> = ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect();

    let full = image.materialize_with(config)?;
    let header = image.header();
    let score = |&(x, y): &(u32, u32)| -> f64 {
        let s = strategy.score(&full.crop(Rect::new(x, y, width, height)), header);
        if s.is_nan() {
            f64::NEG_INFINITY
        } else {
            s
        }
    };
    let scores: Vec<f64> = match get_pool().filter(|_| config.parallel) {
        Some(pool) => pool.install(|| candidates.par_iter().map(score).collect()),
        None => candidates.iter().map(score).collect(),
    };

    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    let (x, y) = candidates[best];
    debug!(
        target: "lazy_image_ops::crop",
        candidates = candidates.len(),
        x,
        y,
        score = scores[best],
        "crop window selected"
    );
    Ok((x, y))
}

/// Search with `strategy` and return the chosen window.
pub fn smart_crop(image: &Image, width: u32, height: u32, strategy: &dyn CropStrategy) -> Result<Image> {
    let (x, y) = crop(image, width, height, strategy)?;
    extract_area(image, x, y, width, height)
}

/// The `width x height` area at `(left, top)`.
pub fn extract_area(image: &Image, left: u32, top: u32, width: u32, height: u32) -> Result<Image> {
    if width == 0 || height == 0 {
        return Err(ImageOpsError::invalid_argument(
            "area",
            format!("{width}x{height}"),
            "width and height must be at least 1",
        ));
    }
    let area = Rect::new(left, top, width, height);
    let fits = left
        .checked_add(width)
        .zip(top.checked_add(height))
        .is_some_and(|_| image.bounds().contains_rect(&area));
    if !fits {
        return Err(ImageOpsError::region_out_of_bounds(
            left,
            top,
            width,
            height,
            image.width(),
            image.height(),
        ));
    }
    if area == image.bounds() {
        return Ok(image.clone());
    }
    let header = image.header();
    let out = header.derive(width, height, header.bands, header.has_alpha);
    Ok(Image::with_operation(
        Operation::Extract {
            left,
            top,
            width,
            height,
        },
        vec![image.clone()],
        out,
    ))
}
