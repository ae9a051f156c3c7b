// src/engine/api.rs
//
// Chainable methods on Image. Each one delegates to the free function of the
// same name, so both styles build identical graphs.
//
// Usage:
// ```rust
// # use lazy_image_ops::{Image, SampleFormat};
// # fn main() -> lazy_image_ops::Result<()> {
// let img = Image::filled(64, 64, SampleFormat::U8, &[40.0, 80.0, 120.0])?;
// let out = img.gamma(2.2)?.blur(1.0)?.normalise()?;
// assert_eq!(out.width(), 64);
// # Ok(())
// # }
// ```

use crate::engine::image::Image;
use crate::engine::{cache, composite, crop, filter, threshold, tone, trim};
use crate::error::Result;
use crate::ops::{BooleanOp, Gravity, Kernel};

impl Image {
    /// `self` placed over `dst` (see [`composite::composite`]).
    pub fn composite_over(&self, dst: &Image, gravity: Gravity) -> Result<Image> {
        composite::composite(self, dst, gravity)
    }

    /// `self` placed over `dst` at an explicit offset.
    pub fn composite_over_at(&self, dst: &Image, x: i64, y: i64) -> Result<Image> {
        composite::composite_at(self, dst, x, y)
    }

    /// `overlay` drawn onto `self` at the origin.
    pub fn overlay(&self, overlay: &Image) -> Result<Image> {
        composite::composite_image(overlay, self)
    }

    /// `stencil` punched out of `self`'s alpha.
    pub fn cutout(&self, stencil: &Image, gravity: Gravity) -> Result<Image> {
        composite::cutout(stencil, self, gravity)
    }

    pub fn ensure_alpha(&self) -> Result<Image> {
        composite::ensure_alpha(self)
    }

    pub fn premultiply(&self) -> Result<Image> {
        composite::premultiply(self)
    }

    pub fn unpremultiply(&self) -> Result<Image> {
        composite::unpremultiply(self)
    }

    pub fn normalise(&self) -> Result<Image> {
        tone::normalise(self)
    }

    pub fn gamma(&self, exponent: f64) -> Result<Image> {
        tone::gamma(self, exponent)
    }

    pub fn blur(&self, sigma: f64) -> Result<Image> {
        filter::blur(self, sigma)
    }

    pub fn sharpen(&self, sigma: f64, flat: f64, jagged: f64) -> Result<Image> {
        filter::sharpen(self, sigma, flat, jagged)
    }

    pub fn convolve(&self, kernel: Kernel) -> Result<Image> {
        filter::convolve_kernel(self, kernel)
    }

    pub fn threshold(&self, threshold: f64, colour: bool) -> Result<Image> {
        threshold::threshold(self, threshold, colour)
    }

    pub fn bandbool(&self, op: BooleanOp) -> Result<Image> {
        threshold::bandbool(self, op)
    }

    pub fn boolean(&self, other: &Image, op: BooleanOp) -> Result<Image> {
        threshold::boolean(self, other, op)
    }

    pub fn extract_area(&self, left: u32, top: u32, width: u32, height: u32) -> Result<Image> {
        crop::extract_area(self, left, top, width, height)
    }

    /// Offset of the best `width x height` window.
    pub fn crop_offset(&self, width: u32, height: u32, strategy: &dyn crop::CropStrategy) -> Result<(u32, u32)> {
        crop::crop(self, width, height, strategy)
    }

    pub fn smart_crop(&self, width: u32, height: u32, strategy: &dyn crop::CropStrategy) -> Result<Image> {
        crop::smart_crop(self, width, height, strategy)
    }

    pub fn trim(&self, tolerance: f64) -> Result<Image> {
        trim::trim(self, tolerance)
    }

    pub fn tile_cache(&self, factor: f64) -> Result<Image> {
        cache::tile_cache(self, factor)
    }
}
