// src/engine/image.rs
//
// The image value: an immutable, Arc-shared handle to a node of the
// computation graph. Building a value never touches pixels; rendering a
// region pulls exactly the input regions each node needs.

use crate::engine::cache::TileCache;
use crate::engine::config::{config, EngineConfig};
use crate::engine::pipeline;
use crate::engine::pool::get_pool;
use crate::engine::region::{Rect, Region};
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{ImageOpsError, Result};
use crate::ops::Operation;
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Sample storage format. Samples are carried as f32 in the format's native range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16,
    F32,
}

impl SampleFormat {
    /// Largest representable sample (also the opaque alpha value).
    pub fn max_value(self) -> f32 {
        match self {
            SampleFormat::U8 => 255.0,
            SampleFormat::U16 => 65535.0,
            SampleFormat::F32 => 1.0,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SampleFormat::F32)
    }

    /// Round and clamp integer formats; float samples pass through.
    #[inline]
    pub fn quantize(self, value: f32) -> f32 {
        if self.is_integer() {
            value.round().clamp(0.0, self.max_value())
        } else {
            value
        }
    }

    /// Clamp to `[0, max]` for every format.
    #[inline]
    pub fn saturate(self, value: f32) -> f32 {
        self.quantize(value.clamp(0.0, self.max_value()))
    }
}

/// Width, height, bands, sample format and alpha flag of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub format: SampleFormat,
    pub has_alpha: bool,
}

/// Check that dimensions stay within global safety limits.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImageOpsError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImageOpsError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

impl ImageHeader {
    /// Alpha is inferred for 2-band (grey + alpha) and 4-band (RGB + alpha) images.
    pub fn new(width: u32, height: u32, bands: u32, format: SampleFormat) -> Result<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(ImageOpsError::invalid_dimensions(width, height, bands));
        }
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            bands,
            format,
            has_alpha: bands == 2 || bands == 4,
        })
    }

    /// Override alpha inference. A single band can never be alpha.
    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha && self.bands >= 2;
        self
    }

    pub(crate) fn derive(&self, width: u32, height: u32, bands: u32, has_alpha: bool) -> Self {
        Self {
            width,
            height,
            bands,
            format: self.format,
            has_alpha: has_alpha && bands >= 2,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    pub fn colour_bands(&self) -> u32 {
        self.bands - u32::from(self.has_alpha)
    }

    pub fn alpha_band(&self) -> Option<usize> {
        self.has_alpha.then(|| self.bands as usize - 1)
    }

    pub fn shape(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.bands)
    }
}

/// Lazily computed upstream pixels supplied by the embedding pipeline.
pub trait RegionSource: Send + Sync {
    /// Produce the samples of `rect`, which always lies inside the image.
    fn render(&self, rect: Rect) -> Result<Region>;
}

impl<F> RegionSource for F
where
    F: Fn(Rect) -> Result<Region> + Send + Sync,
{
    fn render(&self, rect: Rect) -> Result<Region> {
        self(rect)
    }
}

/// Luminance extremes of a node's first input, computed on first render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LumaRange {
    pub min: f32,
    pub max: f32,
}

pub(crate) enum NodeKind {
    Buffer(Region),
    Source(Box<dyn RegionSource>),
    Op {
        op: Operation,
        inputs: Vec<Image>,
        stats: OnceCell<LumaRange>,
    },
    Cache(TileCache),
}

pub(crate) struct Node {
    pub(crate) header: ImageHeader,
    pub(crate) kind: NodeKind,
}

/// Immutable image value. Cloning is cheap and shares the computation graph.
#[derive(Clone)]
pub struct Image {
    node: Arc<Node>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.node.kind {
            NodeKind::Buffer(_) => "buffer",
            NodeKind::Source(_) => "source",
            NodeKind::Op { op, .. } => op.contract().name,
            NodeKind::Cache(_) => "tile_cache",
        };
        f.debug_struct("Image")
            .field("header", &self.node.header)
            .field("node", &kind)
            .finish()
    }
}

impl Image {
    fn from_node(header: ImageHeader, kind: NodeKind) -> Self {
        Self {
            node: Arc::new(Node { header, kind }),
        }
    }

    /// Wrap interleaved samples (`width * height * bands` values).
    pub fn from_raw(
        width: u32,
        height: u32,
        bands: u32,
        format: SampleFormat,
        samples: Vec<f32>,
    ) -> Result<Self> {
        let header = ImageHeader::new(width, height, bands, format)?;
        Self::from_header_and_samples(header, samples)
    }

    pub fn from_header_and_samples(header: ImageHeader, samples: Vec<f32>) -> Result<Self> {
        let expected = header.bounds().area() * header.bands as usize;
        let actual = samples.len();
        let region = Region::from_samples(header.bounds(), header.bands as usize, samples)
            .ok_or_else(|| ImageOpsError::buffer_size_mismatch(expected, actual))?;
        Ok(Self::from_node(header, NodeKind::Buffer(region)))
    }

    /// Build from a per-sample function `f(x, y, band)`.
    pub fn from_fn(
        width: u32,
        height: u32,
        bands: u32,
        format: SampleFormat,
        f: impl FnMut(u32, u32, usize) -> f32,
    ) -> Result<Self> {
        let header = ImageHeader::new(width, height, bands, format)?;
        let region = Region::from_fn(header.bounds(), bands as usize, f);
        Ok(Self::from_node(header, NodeKind::Buffer(region)))
    }

    /// Uniform image.
    pub fn filled(
        width: u32,
        height: u32,
        format: SampleFormat,
        pixel: &[f32],
    ) -> Result<Self> {
        Self::from_fn(width, height, pixel.len() as u32, format, |_, _, b| pixel[b])
    }

    /// Lazily computed image backed by an external source.
    pub fn from_source(header: ImageHeader, source: impl RegionSource + 'static) -> Self {
        Self::from_node(header, NodeKind::Source(Box::new(source)))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        fn widen<T: Copy + Into<f32>>(raw: &[T]) -> Vec<f32> {
            raw.iter().map(|&v| v.into()).collect()
        }
        let (bands, format, samples) = match img {
            DynamicImage::ImageLuma8(b) => (1, SampleFormat::U8, widen(b.as_raw())),
            DynamicImage::ImageLumaA8(b) => (2, SampleFormat::U8, widen(b.as_raw())),
            DynamicImage::ImageRgb8(b) => (3, SampleFormat::U8, widen(b.as_raw())),
            DynamicImage::ImageRgba8(b) => (4, SampleFormat::U8, widen(b.as_raw())),
            DynamicImage::ImageLuma16(b) => (1, SampleFormat::U16, widen(b.as_raw())),
            DynamicImage::ImageLumaA16(b) => (2, SampleFormat::U16, widen(b.as_raw())),
            DynamicImage::ImageRgb16(b) => (3, SampleFormat::U16, widen(b.as_raw())),
            DynamicImage::ImageRgba16(b) => (4, SampleFormat::U16, widen(b.as_raw())),
            DynamicImage::ImageRgb32F(b) => (3, SampleFormat::F32, b.as_raw().clone()),
            DynamicImage::ImageRgba32F(b) => (4, SampleFormat::F32, b.as_raw().clone()),
            other => {
                return Err(ImageOpsError::unsupported_format(format!(
                    "{:?}",
                    other.color()
                )))
            }
        };
        Self::from_raw(img.width(), img.height(), bands, format, samples)
    }

    pub fn header(&self) -> &ImageHeader {
        &self.node.header
    }

    pub fn width(&self) -> u32 {
        self.node.header.width
    }

    pub fn height(&self) -> u32 {
        self.node.header.height
    }

    pub fn bands(&self) -> u32 {
        self.node.header.bands
    }

    pub fn format(&self) -> SampleFormat {
        self.node.header.format
    }

    pub fn has_alpha(&self) -> bool {
        self.node.header.has_alpha
    }

    pub fn bounds(&self) -> Rect {
        self.node.header.bounds()
    }

    /// True when both values are the same graph node.
    pub fn is_same(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub(crate) fn with_operation(op: Operation, inputs: Vec<Image>, header: ImageHeader) -> Self {
        debug_assert_eq!(op.contract().input_count(), inputs.len());
        Self::from_node(
            header,
            NodeKind::Op {
                op,
                inputs,
                stats: OnceCell::new(),
            },
        )
    }

    pub(crate) fn with_cache(cache: TileCache, header: ImageHeader) -> Self {
        Self::from_node(header, NodeKind::Cache(cache))
    }

    pub(crate) fn cache(&self) -> Option<&TileCache> {
        match &self.node.kind {
            NodeKind::Cache(cache) => Some(cache),
            _ => None,
        }
    }

    /// Compute the samples of `rect` on the calling thread.
    pub fn render(&self, rect: Rect) -> Result<Region> {
        if rect.is_empty() || !self.bounds().contains_rect(&rect) {
            return Err(ImageOpsError::region_out_of_bounds(
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                self.width(),
                self.height(),
            ));
        }
        pipeline::render(self, rect)
    }

    /// Compute the whole image using the process-wide configuration.
    pub fn materialize(&self) -> Result<Region> {
        self.materialize_with(config())
    }

    /// Compute the whole image strip by strip, in parallel when enabled.
    pub fn materialize_with(&self, config: &EngineConfig) -> Result<Region> {
        if let NodeKind::Buffer(region) = &self.node.kind {
            return Ok(region.clone());
        }
        let bounds = self.bounds();
        let strips = bounds.strips(config.strip_height);
        if strips.len() == 1 {
            return self.render(bounds);
        }

        let rendered: Vec<Region> = match get_pool().filter(|_| config.parallel) {
            Some(pool) => pool.install(|| {
                strips
                    .par_iter()
                    .map(|strip| self.render(*strip))
                    .collect::<Result<Vec<_>>>()
            })?,
            None => strips
                .iter()
                .map(|strip| self.render(*strip))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut out = Region::new(bounds, self.bands() as usize);
        for strip in &rendered {
            out.paste(strip);
        }
        Ok(out)
    }

    /// Materialize into an `image` crate buffer (1-4 bands; float only for 3-4 bands).
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let region = self.materialize()?;
        let (w, h) = (self.width(), self.height());
        let format = self.format();
        let expected = region.samples().len();

        let narrow_u8 = |s: &[f32]| -> Vec<u8> { s.iter().map(|&v| format.saturate(v) as u8).collect() };
        let narrow_u16 =
            |s: &[f32]| -> Vec<u16> { s.iter().map(|&v| format.saturate(v) as u16).collect() };
        let mismatch = || ImageOpsError::buffer_size_mismatch(expected, 0);

        let img = match (self.bands(), format) {
            (1, SampleFormat::U8) => DynamicImage::ImageLuma8(
                ImageBuffer::<Luma<u8>, _>::from_raw(w, h, narrow_u8(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (2, SampleFormat::U8) => DynamicImage::ImageLumaA8(
                ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, narrow_u8(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (3, SampleFormat::U8) => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, narrow_u8(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (4, SampleFormat::U8) => DynamicImage::ImageRgba8(
                ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, narrow_u8(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (1, SampleFormat::U16) => DynamicImage::ImageLuma16(
                ImageBuffer::<Luma<u16>, _>::from_raw(w, h, narrow_u16(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (2, SampleFormat::U16) => DynamicImage::ImageLumaA16(
                ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, narrow_u16(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (3, SampleFormat::U16) => DynamicImage::ImageRgb16(
                ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, narrow_u16(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (4, SampleFormat::U16) => DynamicImage::ImageRgba16(
                ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, narrow_u16(region.samples()))
                    .ok_or_else(mismatch)?,
            ),
            (3, SampleFormat::F32) => DynamicImage::ImageRgb32F(
                ImageBuffer::<Rgb<f32>, _>::from_raw(w, h, region.into_samples())
                    .ok_or_else(mismatch)?,
            ),
            (4, SampleFormat::F32) => DynamicImage::ImageRgba32F(
                ImageBuffer::<Rgba<f32>, _>::from_raw(w, h, region.into_samples())
                    .ok_or_else(mismatch)?,
            ),
            (bands, format) => {
                return Err(ImageOpsError::unsupported_format(format!(
                    "{bands} bands of {format:?}"
                )))
            }
        };
        Ok(img)
    }
}
