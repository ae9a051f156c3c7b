// src/engine/threshold.rs
//
// Binarisation and bitwise band arithmetic.
//
// Threshold only rewrites colour bands. With `colour == false` the luminance
// bit is broadcast to every colour band and alpha passes through unchanged.

use crate::engine::image::{Image, ImageHeader, SampleFormat};
use crate::engine::region::Region;
use crate::engine::tone::luminance;
use crate::error::{ImageOpsError, Result};
use crate::ops::{BooleanOp, Operation};

/// Samples as unsigned integers for bitwise work: rounded, clamped at 0.
#[inline]
fn as_bits(value: f32) -> u32 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, u32::MAX as f32) as u32
    }
}

#[inline]
fn from_bits(bits: u32, format: SampleFormat) -> f32 {
    format.saturate(bits as f32)
}

/// Pixels at or above `threshold` become the format maximum, the rest 0.
///
/// With `colour == false` the decision is made once per pixel on luminance and
/// broadcast to every colour band; otherwise each colour band is thresholded on
/// its own. Alpha passes through.
pub fn threshold(image: &Image, threshold: f64, colour: bool) -> Result<Image> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ImageOpsError::invalid_argument(
            "threshold",
            threshold.to_string(),
            "must be a non-negative finite number",
        ));
    }
    Ok(Image::with_operation(
        Operation::Threshold { threshold, colour },
        vec![image.clone()],
        *image.header(),
    ))
}

/// Fold every band of each pixel with `op` into a single band.
pub fn bandbool(image: &Image, op: BooleanOp) -> Result<Image> {
    if image.bands() < 2 {
        return Err(ImageOpsError::invalid_argument(
            "image",
            format!("{} band", image.bands()),
            "bandbool needs at least 2 bands",
        ));
    }
    let header = image.header();
    let out = header.derive(header.width, header.height, 1, false);
    Ok(Image::with_operation(Operation::Bandbool { op }, vec![image.clone()], out))
}

/// Sample-wise `op` of two images with the same extent and band count. The
/// result keeps the left image's format and alpha flag.
pub fn boolean(left: &Image, right: &Image, op: BooleanOp) -> Result<Image> {
    if left.header().shape() != right.header().shape() {
        return Err(ImageOpsError::shape_mismatch(
            left.header().shape(),
            right.header().shape(),
        ));
    }
    Ok(Image::with_operation(
        Operation::Boolean { op },
        vec![left.clone(), right.clone()],
        *left.header(),
    ))
}

pub(crate) fn threshold_region(
    mut input: Region,
    header: &ImageHeader,
    threshold: f64,
    colour: bool,
) -> Region {
    let max = header.format.max_value();
    let colour_bands = header.colour_bands();
    let level = threshold as f32;
    let bands = input.bands();
    for px in input.samples_mut().chunks_exact_mut(bands) {
        if colour {
            for v in &mut px[..colour_bands as usize] {
                *v = if *v >= level { max } else { 0.0 };
            }
        } else {
            let on = luminance(px, colour_bands) >= level;
            px[..colour_bands as usize].fill(if on { max } else { 0.0 });
        }
    }
    input
}

pub(crate) fn bandbool_region(input: &Region, op: BooleanOp, out: &ImageHeader) -> Region {
    let mut region = Region::new(input.rect(), 1);
    for (dst, px) in region.samples_mut().iter_mut().zip(input.pixels()) {
        let folded = px[1..]
            .iter()
            .fold(as_bits(px[0]), |acc, &v| op.apply(acc, as_bits(v)));
        *dst = from_bits(folded, out.format);
    }
    region
}

pub(crate) fn boolean_region(mut left: Region, right: &Region, op: BooleanOp, out: &ImageHeader) -> Region {
    let format = out.format;
    for (l, &r) in left.samples_mut().iter_mut().zip(right.samples()) {
        *l = from_bits(op.apply(as_bits(*l), as_bits(r)), format);
    }
    left
}
