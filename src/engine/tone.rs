// src/engine/tone.rs
//
// Point operations on tone: luminance stretch (normalise) and gamma.

use crate::engine::image::{Image, ImageHeader, LumaRange};
use crate::engine::region::Region;
use crate::error::{ImageOpsError, Result};
use crate::ops::Operation;

/// Rec. 709 luma weights.
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Luminance of one pixel: the single colour band for grey images, Rec. 709
/// weights over the first three bands otherwise.
#[inline]
pub(crate) fn luminance(pixel: &[f32], colour_bands: u32) -> f32 {
    if colour_bands < 3 {
        pixel[0]
    } else {
        LUMA_WEIGHTS[0] * pixel[0] + LUMA_WEIGHTS[1] * pixel[1] + LUMA_WEIGHTS[2] * pixel[2]
    }
}

/// Stretch luminance to the full range of the sample format. The extremes are
/// measured over the whole image the first time any region is rendered.
pub fn normalise(image: &Image) -> Result<Image> {
    Ok(Image::with_operation(
        Operation::Normalise,
        vec![image.clone()],
        *image.header(),
    ))
}

/// `out = max * (in / max) ^ exponent` on colour bands; alpha is untouched.
pub fn gamma(image: &Image, exponent: f64) -> Result<Image> {
    if !exponent.is_finite() || exponent <= 0.0 {
        return Err(ImageOpsError::invalid_argument(
            "exponent",
            exponent.to_string(),
            "must be a positive finite number",
        ));
    }
    Ok(Image::with_operation(
        Operation::Gamma { exponent },
        vec![image.clone()],
        *image.header(),
    ))
}

pub(crate) fn luma_range(region: &Region, header: &ImageHeader) -> LumaRange {
    let colour = header.colour_bands();
    let (min, max) = region
        .pixels()
        .map(|px| luminance(px, colour))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), l| {
            (lo.min(l), hi.max(l))
        });
    LumaRange { min, max }
}

pub(crate) fn normalise_region(mut input: Region, header: &ImageHeader, range: LumaRange) -> Region {
    let spread = range.max - range.min;
    if !spread.is_finite() || spread <= 0.0 {
        return input;
    }
    let format = header.format;
    let colour = header.colour_bands() as usize;
    let scale = format.max_value() / spread;
    input.map_in_place(|band, v| {
        if band < colour {
            format.saturate((v - range.min) * scale)
        } else {
            v
        }
    });
    input
}

pub(crate) fn gamma_region(mut input: Region, header: &ImageHeader, exponent: f64) -> Region {
    let format = header.format;
    let colour = header.colour_bands() as usize;
    let max = format.max_value();
    let exponent = exponent as f32;
    input.map_in_place(|band, v| {
        if band < colour {
            format.quantize(max * (v.max(0.0) / max).powf(exponent))
        } else {
            v
        }
    });
    input
}
