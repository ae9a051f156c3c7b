// src/engine/filter.rs
//
// Neighbourhood filters: general convolution, Gaussian blur and unsharp-mask
// sharpening. Edges are extended by mirroring, so a constant image stays
// constant under any normalised kernel.
//
// Every filter renders from an input region that the pipeline has already
// grown by the operation margin (clipped to the image); sample coordinates are
// mirrored against the image extent and then lie inside that region.

use crate::engine::image::{Image, ImageHeader};
use crate::engine::region::{Rect, Region};
use crate::error::{ImageOpsError, Result};
use crate::ops::{gaussian_radius, Kernel, Operation};
use tracing::trace;

/// Sigma value that selects the fixed 3x3 kernels.
pub const FAST_SIGMA: f64 = -1.0;

/// Reflect an out-of-range index back into `0..extent` (edge sample repeated).
#[inline]
pub(crate) fn mirror(index: i64, extent: u32) -> u32 {
    let n = extent as i64;
    let mut i = index;
    if i < 0 {
        i = -i - 1;
    }
    if i >= n {
        i = 2 * n - i - 1;
    }
    i.clamp(0, n - 1) as u32
}

/// For each output coordinate in `start..start+len`, the source coordinate of
/// every tap `0..taps` around `anchor`, mirrored into the image and clamped to
/// the rendered input span.
fn tap_table(start: u32, len: u32, taps: u32, anchor: u32, extent: u32, span: (u32, u32)) -> Vec<u32> {
    let mut table = Vec::with_capacity(len as usize * taps as usize);
    for out in start..start + len {
        for t in 0..taps {
            let src = mirror(out as i64 + t as i64 - anchor as i64, extent);
            table.push(src.clamp(span.0, span.1 - 1));
        }
    }
    table
}

/// Normalised 1-D Gaussian of radius `ceil(3 sigma)`.
pub(crate) fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = gaussian_radius(sigma) as i64;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

fn check_sigma(sigma: f64) -> Result<()> {
    if sigma == FAST_SIGMA || (sigma.is_finite() && sigma > 0.0) {
        Ok(())
    } else {
        Err(ImageOpsError::invalid_argument(
            "sigma",
            sigma.to_string(),
            "must be -1 (fast mode) or a positive finite number",
        ))
    }
}

/// Convolve every band with a `width x height` kernel:
/// `out = scale * sum(coefficient * sample) + offset`.
pub fn convolve(
    image: &Image,
    width: u32,
    height: u32,
    scale: f64,
    offset: f64,
    coefficients: &[f64],
) -> Result<Image> {
    let kernel = Kernel::new(width, height, scale, offset, coefficients.to_vec())?;
    convolve_kernel(image, kernel)
}

pub fn convolve_kernel(image: &Image, kernel: Kernel) -> Result<Image> {
    Ok(Image::with_operation(
        Operation::Convolve { kernel },
        vec![image.clone()],
        *image.header(),
    ))
}

/// Gaussian blur of every band. `sigma == -1` selects a 3x3 box blur.
pub fn blur(image: &Image, sigma: f64) -> Result<Image> {
    check_sigma(sigma)?;
    if sigma == FAST_SIGMA {
        return convolve_kernel(image, Kernel::fast_blur());
    }
    Ok(Image::with_operation(
        Operation::Blur { sigma },
        vec![image.clone()],
        *image.header(),
    ))
}

/// Unsharp mask. Detail (`input - gaussian(input)`) is scaled by `flat` in
/// smooth areas and by `jagged` on strong edges, blending linearly between.
/// `sigma == -1` selects a fixed 3x3 sharpening kernel instead.
pub fn sharpen(image: &Image, sigma: f64, flat: f64, jagged: f64) -> Result<Image> {
    check_sigma(sigma)?;
    for (name, value) in [("flat", flat), ("jagged", jagged)] {
        if !value.is_finite() || value < 0.0 {
            return Err(ImageOpsError::invalid_argument(
                name,
                value.to_string(),
                "must be a non-negative finite number",
            ));
        }
    }
    if sigma == FAST_SIGMA {
        return convolve_kernel(image, Kernel::fast_sharpen());
    }
    Ok(Image::with_operation(
        Operation::Sharpen { sigma, flat, jagged },
        vec![image.clone()],
        *image.header(),
    ))
}

pub(crate) fn convolve_region(input: &Region, rect: Rect, kernel: &Kernel, header: &ImageHeader) -> Region {
    let span = input.rect();
    let (kw, kh) = (kernel.width(), kernel.height());
    let (ax, ay) = kernel.anchor();
    let xs = tap_table(rect.x, rect.width, kw, ax, header.width, (span.x, span.right()));
    let ys = tap_table(rect.y, rect.height, kh, ay, header.height, (span.y, span.bottom()));
    let coefficients = kernel.coefficients();
    let (scale, offset) = (kernel.scale(), kernel.offset());
    let bands = input.bands();
    let format = header.format;

    trace!(target: "lazy_image_ops::filter", kw, kh, bands, "convolve");

    let mut out = Region::new(rect, bands);
    let mut sums = vec![0.0f64; bands];
    for (row, y) in (rect.y..rect.bottom()).enumerate() {
        let row_taps = &ys[row * kh as usize..(row + 1) * kh as usize];
        for (col, x) in (rect.x..rect.right()).enumerate() {
            let col_taps = &xs[col * kw as usize..(col + 1) * kw as usize];
            sums.iter_mut().for_each(|s| *s = 0.0);
            for (j, &sy) in row_taps.iter().enumerate() {
                let weights = &coefficients[j * kw as usize..(j + 1) * kw as usize];
                for (&w, &sx) in weights.iter().zip(col_taps) {
                    if w == 0.0 {
                        continue;
                    }
                    for (sum, &v) in sums.iter_mut().zip(input.pixel(sx, sy)) {
                        *sum += w * v as f64;
                    }
                }
            }
            for (dst, sum) in out.pixel_mut(x, y).iter_mut().zip(&sums) {
                *dst = format.quantize((scale * sum + offset) as f32);
            }
        }
    }
    out
}

/// Separable Gaussian, left unquantized.
fn gaussian_pass(input: &Region, rect: Rect, sigma: f64, header: &ImageHeader) -> Region {
    let weights = gaussian_kernel(sigma);
    let taps = weights.len() as u32;
    let radius = taps / 2;
    let span = input.rect();
    let bands = input.bands();

    // Horizontal over every input row, vertical onto the requested rows.
    let xs = tap_table(rect.x, rect.width, taps, radius, header.width, (span.x, span.right()));
    let rows = Rect::new(rect.x, span.y, rect.width, span.height);
    let mut horizontal = Region::new(rows, bands);
    for y in rows.y..rows.bottom() {
        for (col, x) in (rect.x..rect.right()).enumerate() {
            let col_taps = &xs[col * taps as usize..(col + 1) * taps as usize];
            let px = horizontal.pixel_mut(x, y);
            for (&w, &sx) in weights.iter().zip(col_taps) {
                for (acc, &v) in px.iter_mut().zip(input.pixel(sx, y)) {
                    *acc += (w * v as f64) as f32;
                }
            }
        }
    }

    let ys = tap_table(rect.y, rect.height, taps, radius, header.height, (span.y, span.bottom()));
    let mut out = Region::new(rect, bands);
    for (row, y) in (rect.y..rect.bottom()).enumerate() {
        let row_taps = &ys[row * taps as usize..(row + 1) * taps as usize];
        for x in rect.x..rect.right() {
            let px = out.pixel_mut(x, y);
            for (&w, &sy) in weights.iter().zip(row_taps) {
                for (acc, &v) in px.iter_mut().zip(horizontal.pixel(x, sy)) {
                    *acc += (w * v as f64) as f32;
                }
            }
        }
    }
    out
}

pub(crate) fn gaussian_region(input: &Region, rect: Rect, sigma: f64, header: &ImageHeader) -> Region {
    let format = header.format;
    let mut out = gaussian_pass(input, rect, sigma, header);
    out.map_in_place(|_, v| format.quantize(v));
    out
}

pub(crate) fn sharpen_region(
    input: &Region,
    rect: Rect,
    sigma: f64,
    flat: f64,
    jagged: f64,
    header: &ImageHeader,
) -> Region {
    let format = header.format;
    let colour = header.colour_bands() as usize;
    // Detail above 2% of full scale counts as a fully jagged edge.
    let edge = 0.02 * format.max_value();
    let (flat, jagged) = (flat as f32, jagged as f32);

    let mut out = gaussian_pass(input, rect, sigma, header);
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let original = input.pixel(x, y);
            for (band, (dst, &v)) in out.pixel_mut(x, y).iter_mut().zip(original).enumerate() {
                if band >= colour {
                    *dst = v;
                    continue;
                }
                let base = *dst;
                let detail = v - base;
                let strength = (detail.abs() / edge).clamp(0.0, 1.0);
                let gain = flat + (jagged - flat) * strength;
                *dst = format.quantize(base + detail * gain);
            }
        }
    }
    out
}
