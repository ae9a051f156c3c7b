// src/engine/composite.rs
//
// Alpha handling and layering: ensure_alpha, premultiply/unpremultiply,
// Porter-Duff "over" (composite) and the destination-out stencil (cutout).
//
// Composite inputs are premultiplied by contract and every output pixel is
// straight alpha: the blend inside the overlap and the dst pixels outside it are
// both unpremultiplied.

use crate::engine::image::{Image, ImageHeader};
use crate::engine::region::Region;
use crate::engine::tone::luminance;
use crate::error::{ImageOpsError, Result};
use crate::ops::{Gravity, Operation};
use tracing::debug;

/// Where the src lands on the dst, plus the headers needed to interpret samples.
pub(crate) struct Placement<'a> {
    pub left: i64,
    pub top: i64,
    pub src: &'a ImageHeader,
    pub dst: &'a ImageHeader,
    pub out: &'a ImageHeader,
}

impl Placement<'_> {
    /// Source pixel covering output pixel `(x, y)`, if any.
    fn src_pixel<'r>(&self, src: Option<&'r Region>, x: u32, y: u32) -> Option<&'r [f32]> {
        let src = src?;
        let sx = x as i64 - self.left;
        let sy = y as i64 - self.top;
        let rect = src.rect();
        let inside = sx >= rect.x as i64
            && sy >= rect.y as i64
            && sx < rect.right() as i64
            && sy < rect.bottom() as i64;
        inside.then(|| src.pixel(sx as u32, sy as u32))
    }
}

/// A composition is possible when src carries alpha and both images have the
/// same number of colour bands.
pub fn is_input_valid_for_composition(src: &Image, dst: &Image) -> bool {
    src.has_alpha() && src.header().colour_bands() == dst.header().colour_bands()
}

fn composition_error(src: &Image, dst: &Image) -> ImageOpsError {
    let reason = if src.has_alpha() {
        "source and destination have different colour band counts"
    } else {
        "source image has no alpha channel"
    };
    ImageOpsError::invalid_composition(src.bands(), dst.bands(), reason)
}

/// Place premultiplied `src` over premultiplied `dst` according to `gravity`.
///
/// Invalid inputs (see [`is_input_valid_for_composition`]) leave `dst` unchanged.
pub fn composite(src: &Image, dst: &Image, gravity: Gravity) -> Result<Image> {
    let (left, top) = gravity.offset(dst.width(), dst.height(), src.width(), src.height());
    composite_at(src, dst, left, top)
}

/// Place premultiplied `src` over premultiplied `dst` with its top-left corner
/// at `(x, y)`; offsets may be negative or beyond the dst.
///
/// The output has the dst's extent and format, its colour bands plus alpha.
pub fn composite_at(src: &Image, dst: &Image, x: i64, y: i64) -> Result<Image> {
    if !is_input_valid_for_composition(src, dst) {
        debug!(
            target: "lazy_image_ops::composite",
            src_bands = src.bands(),
            dst_bands = dst.bands(),
            src_alpha = src.has_alpha(),
            "composition not possible, returning destination"
        );
        return Ok(dst.clone());
    }
    let header = dst.header();
    let out = header.derive(header.width, header.height, header.colour_bands() + 1, true);
    Ok(Image::with_operation(
        Operation::Composite { left: x, top: y },
        vec![src.clone(), dst.clone()],
        out,
    ))
}

/// Overlay `src` on `dst` at the origin. Both get an alpha band if missing and
/// are premultiplied before blending.
pub fn composite_image(src: &Image, dst: &Image) -> Result<Image> {
    if !is_input_valid_for_composition(src, dst) {
        return Err(composition_error(src, dst));
    }
    let src = premultiply(&ensure_alpha(src)?)?;
    let dst = premultiply(&ensure_alpha(dst)?)?;
    composite_at(&src, &dst, 0, 0)
}

/// Punch a hole into `dst`'s alpha where `src` is opaque (destination-out).
///
/// `src` alpha is the stencil; a src without alpha uses its luminance. The
/// output has the dst's colour bands plus alpha; pixels outside the placed
/// src keep the dst's alpha.
pub fn cutout(src: &Image, dst: &Image, gravity: Gravity) -> Result<Image> {
    let (left, top) = gravity.offset(dst.width(), dst.height(), src.width(), src.height());
    let header = dst.header();
    let out = header.derive(header.width, header.height, header.colour_bands() + 1, true);
    Ok(Image::with_operation(
        Operation::Cutout { left, top },
        vec![src.clone(), dst.clone()],
        out,
    ))
}

/// Append an opaque alpha band unless one is already present.
pub fn ensure_alpha(image: &Image) -> Result<Image> {
    if image.has_alpha() {
        return Ok(image.clone());
    }
    let header = image.header();
    let out = header.derive(header.width, header.height, header.bands + 1, true);
    Ok(Image::with_operation(Operation::EnsureAlpha, vec![image.clone()], out))
}

/// Multiply colour bands by normalised alpha. Images without alpha are returned as is.
pub fn premultiply(image: &Image) -> Result<Image> {
    if !image.has_alpha() {
        return Ok(image.clone());
    }
    Ok(Image::with_operation(
        Operation::Premultiply,
        vec![image.clone()],
        *image.header(),
    ))
}

/// Divide colour bands by normalised alpha; fully transparent pixels become 0.
pub fn unpremultiply(image: &Image) -> Result<Image> {
    if !image.has_alpha() {
        return Ok(image.clone());
    }
    Ok(Image::with_operation(
        Operation::Unpremultiply,
        vec![image.clone()],
        *image.header(),
    ))
}

pub(crate) fn ensure_alpha_region(input: &Region, in_header: &ImageHeader, out: &ImageHeader) -> Region {
    let opaque = in_header.format.max_value();
    let bands = out.bands as usize;
    let mut region = Region::new(input.rect(), bands);
    for (dst, src) in region
        .samples_mut()
        .chunks_exact_mut(bands)
        .zip(input.pixels())
    {
        dst[..bands - 1].copy_from_slice(src);
        dst[bands - 1] = opaque;
    }
    region
}

pub(crate) fn premultiply_region(mut input: Region, header: &ImageHeader) -> Region {
    let Some(alpha) = header.alpha_band() else {
        return input;
    };
    let max = header.format.max_value();
    let bands = input.bands();
    for px in input.samples_mut().chunks_exact_mut(bands) {
        let a = px[alpha] / max;
        for v in &mut px[..alpha] {
            *v *= a;
        }
    }
    input
}

pub(crate) fn unpremultiply_region(mut input: Region, header: &ImageHeader) -> Region {
    let Some(alpha) = header.alpha_band() else {
        return input;
    };
    let max = header.format.max_value();
    let bands = input.bands();
    for px in input.samples_mut().chunks_exact_mut(bands) {
        let a = px[alpha] / max;
        for v in &mut px[..alpha] {
            *v = if a > 0.0 { *v / a } else { 0.0 };
        }
    }
    input
}

/// Porter-Duff over on premultiplied samples, written back unpremultiplied.
pub(crate) fn composite_region(
    src: Option<&Region>,
    dst: &Region,
    placement: &Placement<'_>,
) -> Region {
    let rect = dst.rect();
    let out_header = placement.out;
    let colour = out_header.colour_bands() as usize;
    let out_alpha = colour;
    let src_alpha = placement.src.alpha_band().unwrap_or(colour);
    let dst_alpha = placement.dst.alpha_band();
    let src_max = placement.src.format.max_value();
    let dst_max = placement.dst.format.max_value();
    let to_dst = dst_max / src_max;
    let format = out_header.format;

    let mut out = Region::new(rect, out_header.bands as usize);
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let d = dst.pixel(x, y);
            let px = out.pixel_mut(x, y);
            let Some(s) = placement.src_pixel(src, x, y) else {
                // outside the placed src only dst contributes
                let ad = dst_alpha.map_or(1.0, |i| d[i] / dst_max);
                for c in 0..colour {
                    px[c] = if ad > 0.0 { format.quantize(d[c] / ad) } else { 0.0 };
                }
                px[out_alpha] = dst_alpha.map_or(dst_max, |i| d[i]);
                continue;
            };

            let ad = dst_alpha.map_or(1.0, |i| d[i] / dst_max);
            let a_s = s[src_alpha] / src_max;
            let a_out = a_s + ad * (1.0 - a_s);
            for c in 0..colour {
                let premultiplied = s[c] * to_dst + d[c] * (1.0 - a_s);
                let straight = if a_out > 0.0 { premultiplied / a_out } else { 0.0 };
                px[c] = format.quantize(straight);
            }
            px[out_alpha] = format.quantize(a_out * dst_max);
        }
    }
    out
}

/// Destination-out: `alpha_out = alpha_dst * (1 - stencil)`.
pub(crate) fn cutout_region(src: Option<&Region>, dst: &Region, placement: &Placement<'_>) -> Region {
    let rect = dst.rect();
    let out_header = placement.out;
    let colour = out_header.colour_bands() as usize;
    let dst_alpha = placement.dst.alpha_band();
    let src_alpha = placement.src.alpha_band();
    let src_colour = placement.src.colour_bands();
    let src_max = placement.src.format.max_value();
    let dst_max = placement.dst.format.max_value();
    let format = out_header.format;

    let mut out = Region::new(rect, out_header.bands as usize);
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let d = dst.pixel(x, y);
            let ad = dst_alpha.map_or(dst_max, |i| d[i]);
            let stencil = placement.src_pixel(src, x, y).map_or(0.0, |s| {
                let value = match src_alpha {
                    Some(i) => s[i],
                    None => luminance(s, src_colour),
                };
                (value / src_max).clamp(0.0, 1.0)
            });

            let px = out.pixel_mut(x, y);
            px[..colour].copy_from_slice(&d[..colour]);
            px[colour] = format.quantize(ad * (1.0 - stencil));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::image::SampleFormat;
    use crate::engine::region::Rect;

    fn rgba(width: u32, height: u32, pixel: [f32; 4]) -> Image {
        Image::filled(width, height, SampleFormat::U8, &pixel).unwrap()
    }

    fn rgb(width: u32, height: u32, pixel: [f32; 3]) -> Image {
        Image::filled(width, height, SampleFormat::U8, &pixel).unwrap()
    }

    mod validity_tests {
        use super::*;

        #[test]
        fn test_requires_src_alpha() {
            assert!(!is_input_valid_for_composition(
                &rgb(2, 2, [0.0; 3]),
                &rgb(2, 2, [0.0; 3])
            ));
            assert!(is_input_valid_for_composition(
                &rgba(2, 2, [0.0; 4]),
                &rgb(2, 2, [0.0; 3])
            ));
        }

        #[test]
        fn test_requires_matching_colour_bands() {
            let grey = Image::filled(2, 2, SampleFormat::U8, &[0.0]).unwrap();
            assert!(!is_input_valid_for_composition(&rgba(2, 2, [0.0; 4]), &grey));
        }

        #[test]
        fn test_invalid_composite_returns_dst() {
            let dst = rgb(3, 3, [1.0, 2.0, 3.0]);
            let out = composite(&rgb(2, 2, [0.0; 3]), &dst, Gravity::Centre).unwrap();
            assert!(out.is_same(&dst));
        }

        #[test]
        fn test_composite_image_rejects_invalid() {
            let err = composite_image(&rgb(2, 2, [0.0; 3]), &rgb(2, 2, [0.0; 3])).unwrap_err();
            assert!(matches!(err, ImageOpsError::InvalidComposition { .. }));
        }
    }

    mod over_tests {
        use super::*;

        #[test]
        fn test_opaque_src_replaces_dst() {
            let src = rgba(2, 2, [200.0, 100.0, 50.0, 255.0]);
            let dst = rgba(4, 4, [10.0, 20.0, 30.0, 255.0]);
            let out = composite_at(&src, &dst, 1, 1).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(1, 1), &[200.0, 100.0, 50.0, 255.0]);
            assert_eq!(out.pixel(2, 2), &[200.0, 100.0, 50.0, 255.0]);
            assert_eq!(out.pixel(0, 0), &[10.0, 20.0, 30.0, 255.0]);
            assert_eq!(out.pixel(3, 3), &[10.0, 20.0, 30.0, 255.0]);
        }

        #[test]
        fn test_transparent_src_keeps_dst() {
            let src = rgba(4, 4, [200.0, 100.0, 50.0, 0.0]);
            let dst = rgba(4, 4, [10.0, 20.0, 30.0, 255.0]);
            let out = composite(&src, &dst, Gravity::Centre).unwrap().materialize().unwrap();
            assert!(out.pixels().all(|p| p == [10.0, 20.0, 30.0, 255.0]));
        }

        #[test]
        fn test_half_alpha_blend() {
            // premultiplied white at 50% over opaque black
            let src = rgba(1, 1, [127.5, 127.5, 127.5, 127.5]);
            let dst = rgba(1, 1, [0.0, 0.0, 0.0, 255.0]);
            let out = composite_at(&src, &dst, 0, 0).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(0, 0), &[128.0, 128.0, 128.0, 255.0]);
        }

        #[test]
        fn test_translucent_dst_is_unpremultiplied_everywhere() {
            let src = rgba(2, 1, [0.0; 4]);
            let dst = Image::from_raw(
                4,
                1,
                4,
                SampleFormat::U8,
                vec![
                    50.0, 50.0, 50.0, 128.0, 50.0, 50.0, 50.0, 128.0, //
                    50.0, 50.0, 50.0, 128.0, 7.0, 7.0, 7.0, 0.0,
                ],
            )
            .unwrap();
            let out = composite_at(&src, &dst, 0, 0).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(0, 0), &[100.0, 100.0, 100.0, 128.0]);
            assert_eq!(out.pixel(1, 0), &[100.0, 100.0, 100.0, 128.0]);
            assert_eq!(out.pixel(2, 0), &[100.0, 100.0, 100.0, 128.0]);
            assert_eq!(out.pixel(3, 0), &[0.0, 0.0, 0.0, 0.0]);

            let full = rgba(4, 1, [0.0; 4]);
            let centred = composite(&full, &dst, Gravity::Centre).unwrap().materialize().unwrap();
            assert_eq!(centred, out);
        }

        #[test]
        fn test_dst_without_alpha_gains_opaque_alpha() {
            let src = rgba(1, 1, [0.0, 0.0, 0.0, 0.0]);
            let dst = rgb(2, 1, [5.0, 6.0, 7.0]);
            let out = composite_at(&src, &dst, 0, 0).unwrap();
            assert_eq!(out.bands(), 4);
            assert!(out.has_alpha());
            let region = out.materialize().unwrap();
            assert_eq!(region.pixel(1, 0), &[5.0, 6.0, 7.0, 255.0]);
        }

        #[test]
        fn test_offset_outside_dst_is_noop() {
            let src = rgba(2, 2, [255.0, 0.0, 0.0, 255.0]);
            let dst = rgba(3, 3, [1.0, 2.0, 3.0, 255.0]);
            let out = composite_at(&src, &dst, -5, 10).unwrap().materialize().unwrap();
            assert!(out.pixels().all(|p| p == [1.0, 2.0, 3.0, 255.0]));
        }

        #[test]
        fn test_gravity_south_east() {
            let src = rgba(1, 1, [9.0, 9.0, 9.0, 255.0]);
            let dst = rgba(3, 2, [0.0, 0.0, 0.0, 255.0]);
            let out = composite(&src, &dst, Gravity::SouthEast).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(2, 1), &[9.0, 9.0, 9.0, 255.0]);
            assert_eq!(out.pixel(0, 0), &[0.0, 0.0, 0.0, 255.0]);
        }

        #[test]
        fn test_u16_src_over_u8_dst_is_rescaled() {
            let src = Image::filled(1, 1, SampleFormat::U16, &[65535.0, 0.0, 0.0, 65535.0]).unwrap();
            let dst = rgba(1, 1, [0.0, 0.0, 0.0, 255.0]);
            let out = composite_at(&src, &dst, 0, 0).unwrap();
            assert_eq!(out.format(), SampleFormat::U8);
            assert_eq!(out.materialize().unwrap().pixel(0, 0), &[255.0, 0.0, 0.0, 255.0]);
        }

        #[test]
        fn test_composite_image_overlays_at_origin() {
            let src = rgba(2, 2, [255.0, 255.0, 255.0, 255.0]);
            let dst = rgb(3, 3, [0.0, 0.0, 0.0]);
            let out = composite_image(&src, &dst).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(1, 1), &[255.0, 255.0, 255.0, 255.0]);
            assert_eq!(out.pixel(2, 2), &[0.0, 0.0, 0.0, 255.0]);
        }
    }

    mod cutout_tests {
        use super::*;

        #[test]
        fn test_opaque_stencil_clears_alpha() {
            let src = rgba(2, 2, [0.0, 0.0, 0.0, 255.0]);
            let dst = rgba(4, 4, [10.0, 20.0, 30.0, 255.0]);
            let out = cutout(&src, &dst, Gravity::NorthWest).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(0, 0), &[10.0, 20.0, 30.0, 0.0]);
            assert_eq!(out.pixel(1, 1), &[10.0, 20.0, 30.0, 0.0]);
            assert_eq!(out.pixel(2, 2), &[10.0, 20.0, 30.0, 255.0]);
        }

        #[test]
        fn test_luminance_stencil_without_alpha() {
            let src = Image::filled(1, 1, SampleFormat::U8, &[255.0]).unwrap();
            let dst = rgb(1, 1, [1.0, 2.0, 3.0]);
            let out = cutout(&src, &dst, Gravity::Centre).unwrap();
            assert_eq!(out.bands(), 4);
            assert_eq!(out.materialize().unwrap().pixel(0, 0), &[1.0, 2.0, 3.0, 0.0]);
        }

        #[test]
        fn test_partial_stencil_scales_alpha() {
            let src = Image::filled(1, 1, SampleFormat::U8, &[0.0, 51.0]).unwrap();
            let dst = Image::filled(1, 1, SampleFormat::U8, &[7.0, 200.0]).unwrap();
            let out = cutout(&src, &dst, Gravity::Centre).unwrap().materialize().unwrap();
            assert_eq!(out.pixel(0, 0), &[7.0, 160.0]);
        }
    }

    mod alpha_tests {
        use super::*;

        #[test]
        fn test_ensure_alpha_appends_opaque_band() {
            let img = rgb(2, 1, [1.0, 2.0, 3.0]);
            let out = ensure_alpha(&img).unwrap();
            assert_eq!(out.bands(), 4);
            assert_eq!(out.materialize().unwrap().pixel(1, 0), &[1.0, 2.0, 3.0, 255.0]);
            let already = rgba(1, 1, [0.0; 4]);
            assert!(ensure_alpha(&already).unwrap().is_same(&already));
        }

        #[test]
        fn test_premultiply_round_trip_at_extremes() {
            let img = Image::from_raw(
                2,
                1,
                4,
                SampleFormat::U8,
                vec![10.0, 20.0, 30.0, 255.0, 40.0, 50.0, 60.0, 0.0],
            )
            .unwrap();
            let pre = premultiply(&img).unwrap().materialize().unwrap();
            assert_eq!(pre.pixel(0, 0), &[10.0, 20.0, 30.0, 255.0]);
            assert_eq!(pre.pixel(1, 0), &[0.0, 0.0, 0.0, 0.0]);
            let back = unpremultiply(&premultiply(&img).unwrap()).unwrap();
            let back = back.render(Rect::of_size(1, 1)).unwrap();
            assert_eq!(back.pixel(0, 0), &[10.0, 20.0, 30.0, 255.0]);
        }

        #[test]
        fn test_premultiply_without_alpha_is_identity() {
            let img = rgb(1, 1, [1.0, 2.0, 3.0]);
            assert!(premultiply(&img).unwrap().is_same(&img));
            assert!(unpremultiply(&img).unwrap().is_same(&img));
        }
    }
}
